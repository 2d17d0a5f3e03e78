// ==========================================
// CSV 导入引擎 - 行分组器
// ==========================================
// 规则: 首列（基础映射的第一列）非空 → 新分组；为空 → 续行
// 实现: Peekable 向前看一行，决定当前分组是否闭合
// ==========================================

use crate::importer::csv_importer_trait::FieldMapper;
use crate::importer::file_parser::SourceRow;

// ==========================================
// RowGroup - 逻辑分组
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowGroup {
    pub rows: Vec<SourceRow>,
}

impl RowGroup {
    /// 分组首行
    pub fn first(&self) -> &SourceRow {
        &self.rows[0]
    }

    /// 首行行号
    pub fn line(&self) -> usize {
        self.first().line
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// 分组依据的列（基础映射的第一列；未声明列时为第 0 列）
pub fn leading_column(base: &dyn FieldMapper) -> usize {
    base.columns().first().map(|c| c.sequence).unwrap_or(0)
}

/// 将行序列划分为逻辑分组
///
/// - 空行被跳过，不影响分组状态
/// - 开头的续行自成一组（避免丢数据）
pub fn group_rows<I, F>(rows: I, is_leading: F) -> Vec<RowGroup>
where
    I: IntoIterator<Item = SourceRow>,
    F: Fn(&SourceRow) -> bool,
{
    let mut rows = rows.into_iter().filter(|r| !r.is_blank()).peekable();
    let mut groups = Vec::new();

    while let Some(first) = rows.next() {
        let mut current = vec![first];
        // 下一行仍是续行则并入当前分组
        while let Some(next) = rows.next_if(|r| !is_leading(r)) {
            current.push(next);
        }
        groups.push(RowGroup { rows: current });
    }

    groups
}

/// 按列值分组：指定列非空即为新分组
pub fn group_by_column<I>(rows: I, column: usize) -> Vec<RowGroup>
where
    I: IntoIterator<Item = SourceRow>,
{
    group_rows(rows, |row| !row.cell(column).is_empty())
}
