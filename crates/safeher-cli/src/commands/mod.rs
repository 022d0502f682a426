pub mod compose;
pub mod config;
pub mod contacts;
pub mod doctor;
pub mod history;
pub mod outbox;
pub mod run;
pub mod send;
