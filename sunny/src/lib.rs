pub mod cli; // command-line interface
pub mod diagnostics; // environment report
pub mod loss_log; // per-epoch loss history on disk
pub mod run_config; // validated run configuration
pub mod run_info; // `sunny info`
pub mod run_simulate; // `sunny simulate`
pub mod run_train; // `sunny train`
pub mod sunny_common;
