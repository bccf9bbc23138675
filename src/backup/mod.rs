pub mod archive;
pub mod backup_config;
pub mod command;
pub mod compress;
pub mod finish;
pub mod relocate;
pub mod result_error;
pub mod retention;
pub mod schedule;
pub mod shutdown;
pub mod snapshot;
pub mod stable;
pub mod tar;
pub mod transfer;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
