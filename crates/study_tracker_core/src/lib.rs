pub mod board;
pub mod clock;
pub mod day;
pub mod domain;
pub mod lifecycle;
pub mod memory;
pub mod planning;
pub mod ports;
pub mod service;
pub mod streak;

pub use clock::{FixedClock, SystemClock};
pub use domain::{
    ActiveSession, AuthSession, DailySummary, DayReport, HistoryFilter, NewTask, PlannedTask,
    ProblemCounts, Subject, Task, TaskStatus, User, UserCredentials,
};
pub use memory::InMemoryStore;
pub use ports::{Clock, PortError, PortResult, TrackerStore};
pub use service::Tracker;
