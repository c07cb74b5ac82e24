mod failed;
mod init;
mod run;
mod status;

pub use failed::{cmd_failed_clear, cmd_failed_list};
pub use init::cmd_init;
pub use run::cmd_run;
pub use status::cmd_status;
