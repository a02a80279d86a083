//! Core contracts for LocalHub: the encrypted file vault and the task list.
//! This crate performs no I/O; concrete stores live in `localhub-storage`
//! and `localhub-task`.

pub mod tasks;
pub mod vault;
