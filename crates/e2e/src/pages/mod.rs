//! Page objects for the bug tracker UI

mod bug_list;

pub use bug_list::{BugListPage, DeleteChoice};
