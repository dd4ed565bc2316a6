//! 缓存键构造
//!
//! 两个逻辑等价的查询必须得到同一个键：参数放在 BTreeMap 里，
//! 迭代顺序即规范顺序，与调用方的书写顺序无关。

use std::collections::BTreeMap;

use crate::time_util::Frequency;

/// 构造缓存键：`sync:{domain}:{freq}:{k=v&k=v}`
///
/// 输出形态开关随普通参数一起放进 `params`。
pub fn build(domain: &str, params: &BTreeMap<String, String>, freq: Frequency) -> String {
    let param_part = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    format!("sync:{}:{}:{}", domain, freq.as_str(), param_part)
}
