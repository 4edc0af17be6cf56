use sqlx::sqlite::SqliteRow;

use altura_core::domain::conversation::UserId;
use altura_core::domain::quotation::{DocumentReference, Quotation, QuotationId, QuotationLine};

use super::{
    column, decode_decimal, decode_json, decode_timestamp, encode_json, QuotationRecord,
    QuotationRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlQuotationRepository {
    pool: DbPool,
}

impl SqlQuotationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn file_name_of(path: &str) -> String {
    std::path::Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

fn row_to_record(row: &SqliteRow) -> Result<QuotationRecord, RepositoryError> {
    let lines: Vec<QuotationLine> = decode_json("lines_json", &column::<String>(row, "lines_json")?)?;
    let rental_days: i64 = column(row, "rental_days")?;
    let document_path: Option<String> = column(row, "document_path")?;

    let quotation = Quotation {
        id: QuotationId(column(row, "id")?),
        rental_days: u32::try_from(rental_days)
            .map_err(|_| RepositoryError::Decode(format!("rental_days `{rental_days}` out of range")))?,
        currency: column(row, "currency")?,
        lines,
        subtotal: decode_decimal("subtotal", &column::<String>(row, "subtotal")?)?,
        tax_rate: decode_decimal("tax_rate", &column::<String>(row, "tax_rate")?)?,
        tax: decode_decimal("tax", &column::<String>(row, "tax")?)?,
        total: decode_decimal("total", &column::<String>(row, "total")?)?,
        created_at: decode_timestamp("created_at", &column::<String>(row, "created_at")?)?,
    };

    Ok(QuotationRecord {
        user_id: UserId(column(row, "user_id")?),
        quotation,
        document: document_path
            .map(|path| DocumentReference { file_name: file_name_of(&path), path }),
    })
}

#[async_trait::async_trait]
impl QuotationRepository for SqlQuotationRepository {
    async fn save(&self, record: QuotationRecord) -> Result<(), RepositoryError> {
        let quotation = &record.quotation;
        let equipment_ids: Vec<i64> =
            quotation.equipment_ids().into_iter().map(|id| id.0).collect();

        sqlx::query(
            "INSERT INTO quotation (id, user_id, equipment_ids_json, rental_days, currency,
                                    subtotal, tax_rate, tax, total, lines_json, document_path,
                                    created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET document_path = excluded.document_path",
        )
        .bind(&quotation.id.0)
        .bind(&record.user_id.0)
        .bind(encode_json("equipment_ids", &equipment_ids)?)
        .bind(i64::from(quotation.rental_days))
        .bind(&quotation.currency)
        .bind(quotation.subtotal.to_string())
        .bind(quotation.tax_rate.to_string())
        .bind(quotation.tax.to_string())
        .bind(quotation.total.to_string())
        .bind(encode_json("lines", &quotation.lines)?)
        .bind(record.document.as_ref().map(|document| document.path.clone()))
        .bind(quotation.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<QuotationRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, user_id, rental_days, currency, subtotal, tax_rate, tax, total,
                    lines_json, document_path, created_at
             FROM quotation WHERE user_id = ? ORDER BY created_at ASC",
        )
        .bind(&user_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }
}
