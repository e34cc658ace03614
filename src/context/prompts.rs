//! Conversation text sent to the model.

use crate::llm::{Role, Turn};

pub const SYSTEM_PROMPT: &str =
    "你是一个中医知识问答助手。你需要基于提供的知识回答问题。请记住所有提供的知识，并在最后给出完整的回答。";

pub const ACKNOWLEDGEMENT: &str =
    "好的，我会仔细阅读每部分知识，并在最后给出完整的回答。请提供第一部分知识。";

/// Opening user turn: the question and the announcement that knowledge follows in parts.
pub fn preamble(question: &str) -> String {
    format!(
        "问题是：{}\n\n我会分多次提供知识库内容，请你记住这些知识，最后回答问题。",
        question
    )
}

/// User turn carrying knowledge part `index` (1-based).
pub fn knowledge_part(index: usize, text: &str) -> String {
    format!("这是第{}批知识：\n\n{}", index, text)
}

pub fn final_prompt(question: &str) -> String {
    format!(
        "现在你已经看完了所有知识，请基于这些知识回答最初的问题：{}\n\n\
         请给出完整、准确的回答，如果一个方剂在多本书中出现，请综合回答，告诉我们出自哪本书。\
         但不要自己添加自己查询的信息（如果没有对应书籍就不要写书籍了，直接写结果）。\
         若知识库中没有相关信息，请直接说明。",
        question
    )
}

/// Fold earlier turns of a conversation into the question text.
///
/// With no history the question is returned unchanged.
pub fn compose_question(history: &[Turn], current: &str) -> String {
    if history.is_empty() {
        return current.to_string();
    }
    let mut lines = vec!["历史对话：".to_string()];
    for turn in history {
        let speaker = match turn.role {
            Role::User => "用户",
            Role::Assistant | Role::System => "系统",
        };
        lines.push(format!("{}：\"{}\"", speaker, turn.content));
    }
    lines.push("\n当前问题：".to_string());
    lines.push(format!("\"{}\"", current));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_knowledge_part_numbering() {
        assert_eq!(knowledge_part(3, "实体：甲\n"), "这是第3批知识：\n\n实体：甲\n");
    }

    #[test]
    fn test_final_prompt_mentions_question_and_sources() {
        let prompt = final_prompt("四君子汤的组成？");
        assert!(prompt.starts_with("现在你已经看完了所有知识，请基于这些知识回答最初的问题：四君子汤的组成？\n\n"));
        assert!(prompt.contains("出自哪本书"));
        assert!(prompt.contains("不要自己添加"));
    }

    #[test]
    fn test_compose_question_with_history() {
        let history = vec![Turn::user("腹痛吃什么药？"), Turn::assistant("可用四君子汤。")];
        let composed = compose_question(&history, "它出自哪本书？");
        assert_eq!(
            composed,
            "历史对话：\n用户：\"腹痛吃什么药？\"\n系统：\"可用四君子汤。\"\n\n当前问题：\n\"它出自哪本书？\""
        );
    }

    #[test]
    fn test_compose_question_without_history() {
        assert_eq!(compose_question(&[], "麻黄的性味？"), "麻黄的性味？");
    }
}
