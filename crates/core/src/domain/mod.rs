pub mod history;
pub mod proposal;
pub mod request;
