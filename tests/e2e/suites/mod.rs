//! 测试套件

mod config_wiring;
mod job_scheduler;
mod migration;
mod pullreq_merge;
