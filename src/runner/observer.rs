//! 运行过程观察者
//!
//! 接收整行进度与模型流式片段；事件顺序即运行的真实顺序。

use std::io::Write;

/// 观察者契约：info 整行进度，fragment 流式片段（不带换行），
/// stream_end 表示一次流式输出结束
pub trait RunObserver: Send {
    fn info(&mut self, line: &str);
    fn fragment(&mut self, text: &str);
    fn stream_end(&mut self);
}

/// 控制台观察者：片段即时刷新，保证流式显示
#[derive(Default)]
pub struct ConsoleObserver;

impl RunObserver for ConsoleObserver {
    fn info(&mut self, line: &str) {
        println!("{line}");
    }

    fn fragment(&mut self, text: &str) {
        print!("{text}");
        let _ = std::io::stdout().flush();
    }

    fn stream_end(&mut self) {
        println!();
    }
}

/// 观察者事件（记录用）
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObserverEvent {
    Info(String),
    Fragment(String),
    StreamEnd,
}

/// 记录观察者：按顺序保存全部事件，供断言使用
#[derive(Default)]
pub struct RecordingObserver {
    pub events: Vec<ObserverEvent>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 全部 info 行
    pub fn info_lines(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ObserverEvent::Info(line) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    /// 相邻片段合并后的事件序列，流式文本以整段出现
    pub fn coalesced(&self) -> Vec<ObserverEvent> {
        let mut out: Vec<ObserverEvent> = Vec::new();
        for event in &self.events {
            match (out.last_mut(), event) {
                (Some(ObserverEvent::Fragment(tail)), ObserverEvent::Fragment(text)) => {
                    tail.push_str(text);
                }
                _ => out.push(event.clone()),
            }
        }
        out
    }
}

impl RunObserver for RecordingObserver {
    fn info(&mut self, line: &str) {
        self.events.push(ObserverEvent::Info(line.to_string()));
    }

    fn fragment(&mut self, text: &str) {
        self.events.push(ObserverEvent::Fragment(text.to_string()));
    }

    fn stream_end(&mut self) {
        self.events.push(ObserverEvent::StreamEnd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coalesce_merges_adjacent_fragments() {
        let mut observer = RecordingObserver::new();
        observer.info("第 1 轮");
        observer.fragment("前半");
        observer.fragment("后半");
        observer.stream_end();
        observer.fragment("下一段");
        observer.stream_end();

        assert_eq!(
            observer.coalesced(),
            vec![
                ObserverEvent::Info("第 1 轮".to_string()),
                ObserverEvent::Fragment("前半后半".to_string()),
                ObserverEvent::StreamEnd,
                ObserverEvent::Fragment("下一段".to_string()),
                ObserverEvent::StreamEnd,
            ]
        );
        assert_eq!(observer.info_lines(), vec!["第 1 轮".to_string()]);
    }
}
