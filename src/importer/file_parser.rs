// ==========================================
// CSV 导入引擎 - 方言解析器
// ==========================================
// 职责: 档案字节 + {分隔符, 引号, 表头} → 有序行序列（+ 表头）
// 失败: 解码失败 / 方言无效 均为档案致命
// ==========================================

use crate::domain::profile::CsvProfile;
use crate::domain::types::CsvSeparator;
use crate::importer::error::{ImportError, ImportResult};
use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter};

const UTF8_BOM: char = '\u{feff}';

// ==========================================
// CsvDialect - CSV 方言
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvDialect {
    pub separator: CsvSeparator,
    pub quote: u8,
    pub has_header: bool,
}

impl CsvDialect {
    /// 构造方言
    ///
    /// # 规则
    /// - 引号必须是单个 ASCII 字符
    /// - 引号不能与分隔符相同
    pub fn new(separator: CsvSeparator, quote: &str, has_header: bool) -> ImportResult<Self> {
        let mut chars = quote.chars();
        let quote_char = match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii() && !c.is_ascii_control() => c as u8,
            _ => {
                return Err(ImportError::DialectError(format!(
                    "引号必须是单个可见 ASCII 字符，实际 {:?}",
                    quote
                )))
            }
        };

        if quote_char == separator.as_byte() {
            return Err(ImportError::DialectError(format!(
                "引号与分隔符相同: {:?}",
                quote
            )));
        }

        Ok(Self {
            separator,
            quote: quote_char,
            has_header,
        })
    }

    /// 从 Profile 读取方言
    pub fn from_profile(profile: &CsvProfile) -> ImportResult<Self> {
        Self::new(profile.separator, &profile.quote, profile.has_header)
    }
}

// ==========================================
// SourceRow - 源数据行
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    /// 物理行号（1 起，含表头）
    pub line: usize,
    /// 单元格（已去除首尾空白）
    pub cells: Vec<String>,
}

impl SourceRow {
    pub fn new(line: usize, cells: Vec<String>) -> Self {
        Self { line, cells }
    }

    /// 空行：无单元格或全部为空
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.is_empty())
    }

    /// 指定列的值（越界视为空）
    pub fn cell(&self, index: usize) -> &str {
        self.cells.get(index).map(String::as_str).unwrap_or("")
    }
}

// ==========================================
// CsvRows - 惰性行迭代器
// ==========================================
pub struct CsvRows<'a> {
    records: StringRecordsIntoIter<&'a [u8]>,
    ordinal: usize,
}

impl<'a> CsvRows<'a> {
    fn make_row(&mut self, record: StringRecord) -> SourceRow {
        self.ordinal += 1;
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(self.ordinal);
        let cells = record.iter().map(|c| c.trim().to_string()).collect();
        SourceRow::new(line, cells)
    }
}

impl<'a> Iterator for CsvRows<'a> {
    type Item = ImportResult<SourceRow>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.records.next()? {
            Ok(record) => Some(Ok(self.make_row(record))),
            Err(e) => Some(Err(ImportError::from(e))),
        }
    }
}

/// 解码档案载荷（UTF-8，去除 BOM）
pub fn decode_payload(payload: &[u8]) -> ImportResult<&str> {
    let text = std::str::from_utf8(payload).map_err(|e| {
        ImportError::DecodeError(format!("载荷不是有效的 UTF-8 (偏移 {})", e.valid_up_to()))
    })?;
    Ok(text.strip_prefix(UTF8_BOM).unwrap_or(text))
}

/// 清洗表头：去除不可打印字符与引号，去除首尾空白
pub fn sanitize_header(raw: &str, quote: u8) -> String {
    raw.chars()
        .filter(|c| !c.is_control() && *c != UTF8_BOM)
        .filter(|c| *c != '"' && *c != '\'' && *c != quote as char)
        .collect::<String>()
        .trim()
        .to_string()
}

/// 解析档案载荷
///
/// # 返回
/// - `Ok((rows, headers))`: 行迭代器（惰性）与表头（无表头时为 None）
/// - `Err(DecodeError | CsvParseError)`: 档案致命
pub fn read_dialect<'a>(
    payload: &'a [u8],
    dialect: &CsvDialect,
) -> ImportResult<(CsvRows<'a>, Option<Vec<String>>)> {
    let text = decode_payload(payload)?;

    let reader = ReaderBuilder::new()
        .delimiter(dialect.separator.as_byte())
        .quote(dialect.quote)
        .has_headers(false)
        .flexible(true) // 行宽由引擎统一校验
        .from_reader(text.as_bytes());

    let mut rows = CsvRows {
        records: reader.into_records(),
        ordinal: 0,
    };

    let headers = if dialect.has_header {
        match rows.next() {
            Some(row) => Some(
                row?.cells
                    .iter()
                    .map(|h| sanitize_header(h, dialect.quote))
                    .collect(),
            ),
            None => Some(Vec::new()),
        }
    } else {
        None
    };

    Ok((rows, headers))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comma(has_header: bool) -> CsvDialect {
        CsvDialect::new(CsvSeparator::Comma, "\"", has_header).unwrap()
    }

    #[test]
    fn test_read_with_header() {
        let payload = "name,email\nAcme,info@acme.test\n,sales@acme.test\n".as_bytes();
        let (rows, headers) = read_dialect(payload, &comma(true)).unwrap();
        let rows: Vec<SourceRow> = rows.collect::<ImportResult<_>>().unwrap();

        assert_eq!(headers, Some(vec!["name".to_string(), "email".to_string()]));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[1].cell(0), "");
        assert_eq!(rows[1].cell(1), "sales@acme.test");
        assert_eq!(rows[1].cell(7), "");
    }

    #[test]
    fn test_semicolon_quote_and_trim() {
        let dialect = CsvDialect::new(CsvSeparator::Semicolon, "'", false).unwrap();
        let payload = "'Acme; Ltd' ; 42\n".as_bytes();
        let (rows, headers) = read_dialect(payload, &dialect).unwrap();
        let rows: Vec<SourceRow> = rows.collect::<ImportResult<_>>().unwrap();

        assert!(headers.is_none());
        assert_eq!(rows[0].cells, vec!["Acme; Ltd".to_string(), "42".to_string()]);
    }

    #[test]
    fn test_tab_separator() {
        let dialect = CsvDialect::new(CsvSeparator::Tab, "\"", false).unwrap();
        let (rows, _) = read_dialect(b"a\tb\n", &dialect).unwrap();
        let rows: Vec<SourceRow> = rows.collect::<ImportResult<_>>().unwrap();
        assert_eq!(rows[0].cells.len(), 2);
    }

    #[test]
    fn test_header_sanitized_and_bom_stripped() {
        let payload = "\u{feff}\"na\u{7}me\", 'email' \nx,y\n".as_bytes();
        let (_, headers) = read_dialect(payload, &comma(true)).unwrap();
        assert_eq!(headers, Some(vec!["name".to_string(), "email".to_string()]));
    }

    #[test]
    fn test_invalid_utf8_is_decode_error() {
        let result = read_dialect(&[b'a', 0xff, b'\n'], &comma(false));
        assert!(matches!(result, Err(ImportError::DecodeError(_))));
    }

    #[test]
    fn test_invalid_dialect() {
        assert!(matches!(
            CsvDialect::new(CsvSeparator::Comma, "''", false),
            Err(ImportError::DialectError(_))
        ));
        assert!(matches!(
            CsvDialect::new(CsvSeparator::Comma, "", false),
            Err(ImportError::DialectError(_))
        ));
        assert!(matches!(
            CsvDialect::new(CsvSeparator::Pipe, "|", false),
            Err(ImportError::DialectError(_))
        ));
    }

    #[test]
    fn test_blank_rows() {
        let (rows, _) = read_dialect(b"a,b\n,\n", &comma(false)).unwrap();
        let rows: Vec<SourceRow> = rows.collect::<ImportResult<_>>().unwrap();
        assert!(!rows[0].is_blank());
        assert!(rows[1].is_blank());
    }
}
