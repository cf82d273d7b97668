//! 白名单 CSV 导入
//!
//! 从表格导出的 CSV 中读取项目地址与有效期，校验并规范化后写入存储。
//! 单行失败（CSV 格式、时间、地址）只跳过该行，不中断整批导入。

use crate::config::WhitelistServiceConfig;
use crate::error::{WhitelistError, WhitelistResult};
use crate::metrics::INGESTED_ROWS_TOTAL;
use crate::storage::WhitelistStore;
use crate::types::{WhitelistEntry, is_valid_address};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// 源数据中人工录入的时间格式，例如 `2024-01-01 9:30 AM`
pub const SOURCE_TIME_FORMAT: &str = "%Y-%m-%d %I:%M %p";

/// 必需列及其可接受的表头
const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    ("address", &["address", "Address", "Primary Address"]),
    ("backup_address", &["backup_address", "Backup Address", "backup"]),
    ("start_time", &["start_time", "Start Time", "Start"]),
    ("end_time", &["end_time", "End Time", "End"]),
];

/// CSV 行
#[derive(Debug, Clone, Deserialize)]
struct CsvRow {
    #[serde(default, alias = "Project", alias = "Project Name")]
    project: String,
    #[serde(alias = "Address", alias = "Primary Address")]
    address: String,
    #[serde(alias = "Backup Address", alias = "backup")]
    backup_address: String,
    #[serde(alias = "Start Time", alias = "Start")]
    start_time: String,
    #[serde(alias = "End Time", alias = "End")]
    end_time: String,
    #[serde(default, alias = "Nonce")]
    nonce: Option<String>,
}

/// 导入统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// 读取的数据行数（不含表头）
    pub rows_read: usize,
    /// 被跳过的行数
    pub rows_skipped: usize,
    /// 新插入的地址数
    pub inserted: usize,
    /// 已存在而被忽略的地址数
    pub duplicates: usize,
}

/// 按源时区偏移解析人工录入的时间并换算为 UTC
pub fn parse_source_time(raw: &str, offset: FixedOffset) -> WhitelistResult<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), SOURCE_TIME_FORMAT)
        .map_err(|e| WhitelistError::InvalidTimestamp(format!("{raw:?}: {e}")))?;

    offset
        .from_local_datetime(&naive)
        .single()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| WhitelistError::InvalidTimestamp(format!("{raw:?}: ambiguous local time")))
}

/// 记录导入器
pub struct RecordIngester {
    store: WhitelistStore,
    default_nonce: String,
    source_offset: FixedOffset,
}

impl RecordIngester {
    pub fn new(store: WhitelistStore, default_nonce: impl Into<String>, source_offset: FixedOffset) -> Self {
        Self {
            store,
            default_nonce: default_nonce.into(),
            source_offset,
        }
    }

    /// 从服务配置创建导入器
    pub fn from_config(store: WhitelistStore, config: &WhitelistServiceConfig) -> WhitelistResult<Self> {
        Ok(Self::new(
            store,
            config.default_nonce.clone(),
            config.source_offset()?,
        ))
    }

    /// 导入 CSV 文件
    pub async fn ingest_path(&self, path: &Path) -> WhitelistResult<IngestReport> {
        info!("Importing whitelist records from {}", path.display());
        let file = std::fs::File::open(path)?;
        self.ingest_reader(file).await
    }

    /// 从任意 reader 导入 CSV
    ///
    /// 表头缺少必需列时整体失败；其余问题只跳过对应行。
    pub async fn ingest_reader<R: Read>(&self, reader: R) -> WhitelistResult<IngestReport> {
        let rows = read_rows(reader)?;
        let mut report = IngestReport {
            rows_read: rows.len(),
            ..Default::default()
        };

        for (line, row) in rows {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!("Skipping CSV line {}: {}", line, e);
                    report.rows_skipped += 1;
                    INGESTED_ROWS_TOTAL.with_label_values(&["skipped"]).inc();
                    continue;
                }
            };

            let entries = match self.prepare_row(&row) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(
                        "Skipping line {} (project {:?}): {}",
                        line, row.project, e
                    );
                    report.rows_skipped += 1;
                    INGESTED_ROWS_TOTAL.with_label_values(&["skipped"]).inc();
                    continue;
                }
            };

            for entry in &entries {
                if self.store.insert_if_absent(entry).await? {
                    report.inserted += 1;
                    INGESTED_ROWS_TOTAL.with_label_values(&["inserted"]).inc();
                } else {
                    debug!("Address {} already whitelisted, ignored", entry.address);
                    report.duplicates += 1;
                    INGESTED_ROWS_TOTAL.with_label_values(&["duplicate"]).inc();
                }
            }
        }

        info!(
            "Import finished: rows={}, skipped={}, inserted={}, duplicates={}",
            report.rows_read, report.rows_skipped, report.inserted, report.duplicates
        );
        Ok(report)
    }

    /// 校验一行并生成主地址与备用地址两条记录
    ///
    /// 两条记录共享同一 nonce 与有效期；任一地址无效则整行失败。
    fn prepare_row(&self, row: &CsvRow) -> WhitelistResult<[WhitelistEntry; 2]> {
        let address = row.address.trim();
        let backup_address = row.backup_address.trim();

        for candidate in [address, backup_address] {
            if !is_valid_address(candidate) {
                return Err(WhitelistError::InvalidAddressFormat(candidate.to_string()));
            }
        }

        let start = parse_source_time(&row.start_time, self.source_offset)?;
        let end = parse_source_time(&row.end_time, self.source_offset)?;
        if start > end {
            warn!(
                "Project {:?} has start time after end time ({} > {}), entry will never be valid",
                row.project.trim(),
                start,
                end
            );
        }

        let nonce = row
            .nonce
            .as_deref()
            .map(str::trim)
            .filter(|nonce| !nonce.is_empty())
            .unwrap_or(&self.default_nonce);

        Ok([
            WhitelistEntry::new(address, nonce, start, end),
            WhitelistEntry::new(backup_address, nonce, start, end),
        ])
    }
}

/// 同步读取全部 CSV 行，返回（行号, 解析结果）
fn read_rows<R: Read>(reader: R) -> WhitelistResult<Vec<(u64, Result<CsvRow, csv::Error>)>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    for (column, accepted) in REQUIRED_COLUMNS {
        if !headers.iter().any(|header| accepted.contains(&header)) {
            return Err(WhitelistError::InvalidInput(format!(
                "CSV header is missing column {column:?}"
            )));
        }
    }

    Ok(reader
        .records()
        .enumerate()
        .map(|(index, record)| {
            // 表头占第 1 行
            let fallback = index as u64 + 2;
            match record {
                Ok(record) => {
                    let line = record.position().map_or(fallback, |pos| pos.line());
                    (line, record.deserialize::<CsvRow>(Some(&headers)))
                }
                Err(e) => (e.position().map_or(fallback, |pos| pos.line()), Err(e)),
            }
        })
        .collect())
}
