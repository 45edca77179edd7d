pub mod config_cmd;
pub mod gateway;
pub mod query;
pub mod run;
pub mod tools;
