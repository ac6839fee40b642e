//! PostgreSQL 바 저장소.
//!
//! 키 구간 캐시의 운영용 구현입니다. 바는 `bars` 테이블에 키 당 한 행의
//! upsert로 기록되어 재기록이 멱등하고, 받아 본 구간은 `bar_coverage`
//! 테이블에 서로소 구간 집합으로 유지됩니다.
//!
//! # 사용 예제
//!
//! ```rust,ignore
//! use histfeed_data::PgBarStore;
//!
//! let store = PgBarStore::from_env(&DatabaseConfig::default()).await?;
//! store.migrate().await?;
//! ```

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use tracing::{debug, info, instrument};

use histfeed_core::{Bar, BarSize, DataType, DatabaseConfig, TimeSpan};

use crate::block::{BlockKey, DataBlock};
use crate::coverage::CoverageIndex;
use crate::error::{DataError, Result};
use crate::store::BarStore;

/// 바 데이터베이스 레코드.
#[derive(Debug, Clone, FromRow)]
pub struct BarRecord {
    pub symbol: String,
    pub data_type: String,
    pub bar_size: String,
    pub bar_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
    pub bar_count: i64,
    pub average: Decimal,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl BarRecord {
    /// Bar 도메인 객체로 변환.
    pub fn to_bar(&self) -> Result<Bar> {
        let data_type = self
            .data_type
            .parse::<DataType>()
            .map_err(DataError::ParseError)?;
        let bar_size = BarSize::from_token(&self.bar_size).ok_or_else(|| {
            DataError::ParseError(format!("unknown bar size token: {}", self.bar_size))
        })?;

        Ok(Bar {
            symbol: self.symbol.clone(),
            data_type,
            bar_size,
            time: self.bar_time,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            bar_count: self.bar_count,
            average: self.average,
        })
    }
}

/// PostgreSQL 기반 바 저장소.
#[derive(Clone)]
pub struct PgBarStore {
    pool: PgPool,
}

impl PgBarStore {
    /// 새로운 연결 풀로 저장소를 생성합니다.
    pub async fn connect(database_url: &str, config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to bar store...");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(StdDuration::from_secs(config.connection_timeout_secs))
            .idle_timeout(StdDuration::from_secs(config.idle_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| DataError::ConnectionError(e.to_string()))?;

        info!("Bar store connection established");

        Ok(Self { pool })
    }

    /// `.env`의 `DATABASE_URL`로 연결합니다.
    pub async fn from_env(config: &DatabaseConfig) -> Result<Self> {
        dotenvy::dotenv().ok();
        let url = std::env::var("DATABASE_URL").map_err(|_| {
            DataError::ConfigError("DATABASE_URL environment variable is not set".to_string())
        })?;
        Self::connect(&url, config).await
    }

    /// 기존 연결 풀에서 저장소를 생성합니다.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 내부 연결 풀을 반환합니다.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 데이터베이스 마이그레이션을 실행합니다.
    pub async fn migrate(&self) -> Result<()> {
        info!("Running bar store migrations...");

        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DataError::MigrationError(e.to_string()))?;

        info!("Migrations completed successfully");
        Ok(())
    }

    /// 오래된 바 삭제 (데이터 보존 정책).
    ///
    /// - 분봉/시간봉: 90일 이전 데이터 삭제
    /// - 일봉 이상: 5년 이전 데이터 삭제
    ///
    /// 커버리지 기록도 같은 기준 시각으로 잘라냅니다.
    pub async fn cleanup_old_bars(&self, key: &BlockKey) -> Result<u64> {
        let retention_days = if key.bar_size.is_intraday() {
            90 // 분봉/시간봉: 90일
        } else {
            365 * 5 // 일봉 이상: 5년
        };
        let cutoff = Utc::now() - Duration::days(retention_days);
        let token = key.bar_size.as_token();

        let result = sqlx::query(
            r#"
            DELETE FROM bars
            WHERE symbol = $1 AND data_type = $2 AND bar_size = $3 AND bar_time < $4
            "#,
        )
        .bind(&key.symbol)
        .bind(key.data_type.as_str())
        .bind(token)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| DataError::DeleteError(e.to_string()))?;

        // 커버리지 구간 보정: 기준 시각 이전 부분을 제거
        sqlx::query(
            r#"
            UPDATE bar_coverage SET start_time = $4, updated_at = NOW()
            WHERE symbol = $1 AND data_type = $2 AND bar_size = $3
              AND start_time < $4 AND end_time >= $4
            "#,
        )
        .bind(&key.symbol)
        .bind(key.data_type.as_str())
        .bind(token)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| DataError::QueryError(e.to_string()))?;

        sqlx::query(
            r#"
            DELETE FROM bar_coverage
            WHERE symbol = $1 AND data_type = $2 AND bar_size = $3 AND end_time < $4
            "#,
        )
        .bind(&key.symbol)
        .bind(key.data_type.as_str())
        .bind(token)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| DataError::DeleteError(e.to_string()))?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            info!(key = %key, deleted = deleted, "오래된 바 삭제");
        }

        Ok(deleted)
    }
}

#[async_trait]
impl BarStore for PgBarStore {
    #[instrument(skip(self))]
    async fn query(&self, key: &BlockKey, span: TimeSpan) -> Result<DataBlock> {
        if span.is_empty() {
            return Ok(DataBlock::new());
        }

        let records: Vec<BarRecord> = sqlx::query_as(
            r#"
            SELECT symbol, data_type, bar_size, bar_time,
                   open, high, low, close, volume, bar_count, average, fetched_at
            FROM bars
            WHERE symbol = $1 AND data_type = $2 AND bar_size = $3
              AND bar_time >= $4 AND bar_time <= $5
            ORDER BY bar_time ASC
            "#,
        )
        .bind(&key.symbol)
        .bind(key.data_type.as_str())
        .bind(key.bar_size.as_token())
        .bind(span.start)
        .bind(span.end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DataError::QueryError(e.to_string()))?;

        let mut block = DataBlock::new();
        for record in &records {
            block.insert_bar(record.to_bar()?);
        }

        debug!(key = %key, span = %span, count = block.len(), "캐시에서 바 조회");

        Ok(block)
    }

    #[instrument(skip(self, block), fields(count = block.len()))]
    async fn write(&self, block: &DataBlock) -> Result<usize> {
        if block.is_empty() {
            return Ok(0);
        }

        let keys: Vec<BlockKey> = block.keys().cloned().collect();
        let bars: Vec<Bar> = keys.iter().flat_map(|key| block.bars(key)).collect();

        let mut inserted = 0;

        // UNNEST 패턴으로 일괄 삽입 (N+1 쿼리 문제 해결)
        for chunk in bars.chunks(500) {
            // 각 컬럼에 대한 배열 생성
            let symbols: Vec<&str> = chunk.iter().map(|b| b.symbol.as_str()).collect();
            let data_types: Vec<&str> = chunk.iter().map(|b| b.data_type.as_str()).collect();
            let bar_sizes: Vec<&str> = chunk.iter().map(|b| b.bar_size.as_token()).collect();
            let times: Vec<DateTime<Utc>> = chunk.iter().map(|b| b.time).collect();
            let opens: Vec<Decimal> = chunk.iter().map(|b| b.open).collect();
            let highs: Vec<Decimal> = chunk.iter().map(|b| b.high).collect();
            let lows: Vec<Decimal> = chunk.iter().map(|b| b.low).collect();
            let closes: Vec<Decimal> = chunk.iter().map(|b| b.close).collect();
            let volumes: Vec<i64> = chunk.iter().map(|b| b.volume).collect();
            let bar_counts: Vec<i64> = chunk.iter().map(|b| b.bar_count).collect();
            let averages: Vec<Decimal> = chunk.iter().map(|b| b.average).collect();

            let result = sqlx::query(
                r#"
                INSERT INTO bars
                    (symbol, data_type, bar_size, bar_time,
                     open, high, low, close, volume, bar_count, average, fetched_at)
                SELECT * FROM UNNEST(
                    $1::text[], $2::text[], $3::text[], $4::timestamptz[],
                    $5::numeric[], $6::numeric[], $7::numeric[], $8::numeric[],
                    $9::bigint[], $10::bigint[], $11::numeric[]
                ), NOW()
                ON CONFLICT (symbol, data_type, bar_size, bar_time) DO UPDATE SET
                    open = EXCLUDED.open,
                    high = EXCLUDED.high,
                    low = EXCLUDED.low,
                    close = EXCLUDED.close,
                    volume = EXCLUDED.volume,
                    bar_count = EXCLUDED.bar_count,
                    average = EXCLUDED.average,
                    fetched_at = NOW()
                "#,
            )
            .bind(&symbols)
            .bind(&data_types)
            .bind(&bar_sizes)
            .bind(&times)
            .bind(&opens)
            .bind(&highs)
            .bind(&lows)
            .bind(&closes)
            .bind(&volumes)
            .bind(&bar_counts)
            .bind(&averages)
            .execute(&self.pool)
            .await
            .map_err(|e| DataError::InsertError(e.to_string()))?;

            inserted += result.rows_affected() as usize;
        }

        info!(count = inserted, "바 데이터 캐시에 저장");

        Ok(inserted)
    }

    async fn coverage(&self, key: &BlockKey) -> Result<Vec<TimeSpan>> {
        let rows: Vec<(DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT start_time, end_time FROM bar_coverage
            WHERE symbol = $1 AND data_type = $2 AND bar_size = $3
            ORDER BY start_time ASC
            "#,
        )
        .bind(&key.symbol)
        .bind(key.data_type.as_str())
        .bind(key.bar_size.as_token())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DataError::QueryError(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(start, end)| TimeSpan::new(start, end))
            .collect())
    }

    #[instrument(skip(self))]
    async fn record_coverage(&self, key: &BlockKey, span: TimeSpan) -> Result<()> {
        if span.is_empty() {
            return Ok(());
        }

        // 기존 구간과 메모리에서 병합한 뒤 키의 구간 집합을 통째로 교체
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DataError::ConnectionError(e.to_string()))?;

        let rows: Vec<(DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT start_time, end_time FROM bar_coverage
            WHERE symbol = $1 AND data_type = $2 AND bar_size = $3
            FOR UPDATE
            "#,
        )
        .bind(&key.symbol)
        .bind(key.data_type.as_str())
        .bind(key.bar_size.as_token())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| DataError::QueryError(e.to_string()))?;

        let mut index = CoverageIndex::new();
        for (start, end) in rows {
            index.mark_covered(key, TimeSpan::new(start, end));
        }
        index.mark_covered(key, span);

        sqlx::query(
            r#"
            DELETE FROM bar_coverage
            WHERE symbol = $1 AND data_type = $2 AND bar_size = $3
            "#,
        )
        .bind(&key.symbol)
        .bind(key.data_type.as_str())
        .bind(key.bar_size.as_token())
        .execute(&mut *tx)
        .await
        .map_err(|e| DataError::DeleteError(e.to_string()))?;

        for merged in index.covered(key) {
            sqlx::query(
                r#"
                INSERT INTO bar_coverage
                    (symbol, data_type, bar_size, start_time, end_time, updated_at)
                VALUES ($1, $2, $3, $4, $5, NOW())
                "#,
            )
            .bind(&key.symbol)
            .bind(key.data_type.as_str())
            .bind(key.bar_size.as_token())
            .bind(merged.start)
            .bind(merged.end)
            .execute(&mut *tx)
            .await
            .map_err(|e| DataError::InsertError(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| DataError::QueryError(e.to_string()))?;

        debug!(key = %key, span = %span, "커버리지 기록");

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| DataError::QueryError(e.to_string()))?;
        Ok(())
    }
}

// =============================================================================
// 테스트
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_record_to_bar_round_trip() {
        let record = BarRecord {
            symbol: "GS".to_string(),
            data_type: "TRADES".to_string(),
            bar_size: "1d".to_string(),
            bar_time: Utc.with_ymd_and_hms(2017, 9, 1, 0, 0, 0).unwrap(),
            open: dec!(222.25),
            high: dec!(224.49),
            low: dec!(221.82),
            close: dec!(223.33),
            volume: 1_821_400,
            bar_count: 18_214,
            average: dec!(223.08),
            fetched_at: None,
        };

        let bar = record.to_bar().unwrap();
        assert_eq!(bar.data_type, DataType::Trades);
        assert_eq!(bar.bar_size, BarSize::D1);
        assert_eq!(bar.close, dec!(223.33));
    }

    #[test]
    fn test_record_with_unknown_bar_size_fails() {
        let record = BarRecord {
            symbol: "GS".to_string(),
            data_type: "TRADES".to_string(),
            bar_size: "7q".to_string(),
            bar_time: Utc.with_ymd_and_hms(2017, 9, 1, 0, 0, 0).unwrap(),
            open: dec!(1),
            high: dec!(1),
            low: dec!(1),
            close: dec!(1),
            volume: 0,
            bar_count: 0,
            average: dec!(1),
            fetched_at: None,
        };

        assert!(matches!(record.to_bar(), Err(DataError::ParseError(_))));
    }
}
