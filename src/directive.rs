//! 负责人指令解析
//!
//! 负责人的回复以 continue / task_done / task_failed 之一开头（大小写
//! 不敏感），其后可带冒号或空白分隔的补充说明。不符合语法的回复一律
//! 按 continue 处理，解析永远不会让任务中断。

use crate::prompt::FALLBACK_INSTRUCTION;

/// 指令类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirectiveKind {
    /// 继续执行，携带下一条指令
    Continue,
    /// 任务已完成，进入总结回合
    Done,
    /// 任务失败，直接终止
    Failed,
    /// 回复不以任何关键词开头，按继续处理
    Unrecognized,
}

/// 从负责人回复解析出的指令与补充说明
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Directive {
    pub kind: DirectiveKind,
    /// 关键词之后的剩余文本；为空时退回固定指令
    pub instruction: String,
}

/// 指令关键词表
const DIRECTIVE_TOKENS: [(&str, DirectiveKind); 3] = [
    ("continue", DirectiveKind::Continue),
    ("task_done", DirectiveKind::Done),
    ("task_failed", DirectiveKind::Failed),
];

/// 关键词与补充说明之间允许的分隔字符
const SEPARATORS: &[char] = &[':', ' ', '\t', '\r', '\n'];

impl Directive {
    /// 解析负责人回复
    ///
    /// 关键词必须位于回复的第一个字节；其后连续的冒号与空白被跳过，
    /// 剩余文本去除首尾空白后作为下一条执行指令。
    pub fn parse(reply: &str) -> Self {
        for (token, kind) in DIRECTIVE_TOKENS {
            // 按字节比较前缀，回复以多字节字符开头时直接不匹配
            let Some(prefix) = reply.as_bytes().get(..token.len()) else {
                continue;
            };
            if !prefix.eq_ignore_ascii_case(token.as_bytes()) {
                continue;
            }
            // 关键词是纯 ASCII，切片落在字符边界上
            let rest = reply[token.len()..].trim_start_matches(SEPARATORS).trim();
            let instruction = if rest.is_empty() {
                FALLBACK_INSTRUCTION.to_string()
            } else {
                rest.to_string()
            };
            return Self { kind, instruction };
        }
        Self {
            kind: DirectiveKind::Unrecognized,
            instruction: FALLBACK_INSTRUCTION.to_string(),
        }
    }
}
