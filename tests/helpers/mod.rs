pub mod db;
pub mod policy;

pub use db::TestDb;
pub use policy::{context, DemoPolicy, FailingBoundary, FixedPlan, Hanging};
