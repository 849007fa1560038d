pub mod llm;

pub use llm::{
    CompletionRequest, Message, OpenAICompatibleOracle, Oracle, Reply, ScriptedOracle, Tier,
    ToolCallRequest,
};
