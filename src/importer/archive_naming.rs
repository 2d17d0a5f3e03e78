// ==========================================
// CSV 导入引擎 - 档案命名
// ==========================================
// 格式: <YYYY-MM-DD>_<同日序号>_<profile 名 slug>.csv
// 序号: 同日同 slug 已有档案数（0 起）
// ==========================================

use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

static STRIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("valid regex"));
static HYPHEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-\s]+").expect("valid regex"));

/// 生成 slug
///
/// 1. NFKD 分解后丢弃非 ASCII 字符
/// 2. 删除 [^\w\s-]
/// 3. 去除首尾空白并转小写
/// 4. 连续的 '-' 与空白合并为单个 '-'
pub fn slugify(value: &str) -> String {
    let folded: String = value.nfkd().filter(char::is_ascii).collect();
    let stripped = STRIP_RE.replace_all(&folded, "");
    let lowered = stripped.trim().to_lowercase();
    HYPHEN_RE.replace_all(&lowered, "-").into_owned()
}

/// 档案名
pub fn archive_name(date: NaiveDate, sequence: usize, profile_name: &str) -> String {
    format!(
        "{}_{}_{}.csv",
        date.format("%Y-%m-%d"),
        sequence,
        slugify(profile_name)
    )
}

/// 档案名前缀（用于按日期筛选候选名）
pub fn date_prefix(date: NaiveDate) -> String {
    format!("{}_", date.format("%Y-%m-%d"))
}

/// 计算同日同 slug 的下一个序号
pub fn next_sequence(
    existing: &[String],
    date: NaiveDate,
    profile_name: &str,
) -> Result<usize, regex::Error> {
    let pattern = format!(
        r"^{}_\d+_{}\.csv$",
        regex::escape(&date.format("%Y-%m-%d").to_string()),
        regex::escape(&slugify(profile_name))
    );
    let re = Regex::new(&pattern)?;
    Ok(existing.iter().filter(|name| re.is_match(name)).count())
}
