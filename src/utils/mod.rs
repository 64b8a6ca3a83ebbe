//! 工具函数模块

use chrono::{DateTime, SecondsFormat, Utc};

/// RFC3339 格式（秒精度，`Z` 结尾）
pub fn format_rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// 当前 UTC 时间的 RFC3339 字符串
pub fn now_rfc3339() -> String {
    format_rfc3339(Utc::now())
}
