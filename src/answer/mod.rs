pub mod composer;

pub use composer::{AnswerComposer, INSUFFICIENT_CONTEXT_ANSWER};
