//! 可观测性

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 初始化日志：默认级别 info，debug 开关打开时为 debug；
/// RUST_LOG 中的指令会叠加（如 duet=trace）
pub fn init(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(default_level.parse().unwrap()))
        .with(fmt::layer())
        .init();
}
