pub mod final_answer;
pub mod plan;

pub use final_answer::FinalAnswerTool;
pub use plan::{PlanBoard, PlanStep, PlanTool};
