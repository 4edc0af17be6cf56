use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;

use altura_core::domain::equipment::{Equipment, EquipmentId};

use super::{column, decode_decimal, decode_json, encode_json, EquipmentRepository, RepositoryError};
use crate::DbPool;

const SELECT_EQUIPMENT: &str = "SELECT id, name, category, description, max_height, daily_price,
        weekly_price, monthly_price, specifications_json, use_cases_json,
        safety_requirements, available
 FROM equipment";

pub struct SqlEquipmentRepository {
    pool: DbPool,
}

impl SqlEquipmentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn optional_decimal(row: &SqliteRow, field: &str) -> Result<Option<Decimal>, RepositoryError> {
    column::<Option<String>>(row, field)?.map(|raw| decode_decimal(field, &raw)).transpose()
}

fn row_to_equipment(row: &SqliteRow) -> Result<Equipment, RepositoryError> {
    Ok(Equipment {
        id: EquipmentId(column(row, "id")?),
        name: column(row, "name")?,
        category: column(row, "category")?,
        description: column(row, "description")?,
        max_height: decode_decimal("max_height", &column::<String>(row, "max_height")?)?,
        daily_price: decode_decimal("daily_price", &column::<String>(row, "daily_price")?)?,
        weekly_price: optional_decimal(row, "weekly_price")?,
        monthly_price: optional_decimal(row, "monthly_price")?,
        specifications: decode_json(
            "specifications_json",
            &column::<String>(row, "specifications_json")?,
        )?,
        use_cases: decode_json("use_cases_json", &column::<String>(row, "use_cases_json")?)?,
        safety_requirements: column(row, "safety_requirements")?,
        available: column(row, "available")?,
    })
}

#[async_trait::async_trait]
impl EquipmentRepository for SqlEquipmentRepository {
    async fn list_all(&self) -> Result<Vec<Equipment>, RepositoryError> {
        let rows = sqlx::query(&format!("{SELECT_EQUIPMENT} ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_equipment).collect()
    }

    async fn find_many(&self, ids: &[EquipmentId]) -> Result<Vec<Equipment>, RepositoryError> {
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            let row = sqlx::query(&format!("{SELECT_EQUIPMENT} WHERE id = ?"))
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| RepositoryError::NotFound { entity: "equipment", id: id.to_string() })?;
            items.push(row_to_equipment(&row)?);
        }
        Ok(items)
    }

    async fn save(&self, item: Equipment) -> Result<(), RepositoryError> {
        let specifications = encode_json("specifications", &item.specifications)?;
        let use_cases = encode_json("use_cases", &item.use_cases)?;

        sqlx::query(
            "INSERT INTO equipment (id, name, category, description, max_height, daily_price,
                                    weekly_price, monthly_price, specifications_json,
                                    use_cases_json, safety_requirements, available, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 category = excluded.category,
                 description = excluded.description,
                 max_height = excluded.max_height,
                 daily_price = excluded.daily_price,
                 weekly_price = excluded.weekly_price,
                 monthly_price = excluded.monthly_price,
                 specifications_json = excluded.specifications_json,
                 use_cases_json = excluded.use_cases_json,
                 safety_requirements = excluded.safety_requirements,
                 available = excluded.available",
        )
        .bind(item.id.0)
        .bind(&item.name)
        .bind(&item.category)
        .bind(&item.description)
        .bind(item.max_height.to_string())
        .bind(item.daily_price.to_string())
        .bind(item.weekly_price.map(|price| price.to_string()))
        .bind(item.monthly_price.map(|price| price.to_string()))
        .bind(&specifications)
        .bind(&use_cases)
        .bind(&item.safety_requirements)
        .bind(item.available)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM equipment").fetch_one(&self.pool).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rust_decimal::Decimal;

    use altura_core::domain::equipment::{Equipment, EquipmentId};

    use super::SqlEquipmentRepository;
    use crate::repositories::{EquipmentRepository, RepositoryError};
    use crate::{connect_with_settings, migrations};

    fn ladder() -> Equipment {
        Equipment {
            id: EquipmentId(40),
            name: "Escalera Tijera 2m".to_owned(),
            category: "escaleras".to_owned(),
            description: "Escalera tipo tijera".to_owned(),
            max_height: Decimal::new(25, 1),
            daily_price: Decimal::from(12_000),
            weekly_price: None,
            monthly_price: Some(Decimal::from(240_000)),
            specifications: BTreeMap::from([("material".to_owned(), "Fibra".to_owned())]),
            use_cases: vec!["interiores".to_owned()],
            safety_requirements: None,
            available: true,
        }
    }

    async fn repo() -> SqlEquipmentRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlEquipmentRepository::new(pool)
    }

    #[tokio::test]
    async fn save_and_list_preserve_exact_decimals() {
        let repo = repo().await;
        repo.save(ladder()).await.expect("save");

        let items = repo.list_all().await.expect("list");
        assert_eq!(items, vec![ladder()]);
        assert_eq!(items[0].max_height, Decimal::new(25, 1));
        assert_eq!(repo.count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn find_many_keeps_order_and_reports_missing_ids() {
        let repo = repo().await;
        let mut second = ladder();
        second.id = EquipmentId(41);
        repo.save(ladder()).await.expect("save");
        repo.save(second).await.expect("save");

        let found = repo.find_many(&[EquipmentId(41), EquipmentId(40)]).await.expect("find");
        assert_eq!(found.iter().map(|item| item.id.0).collect::<Vec<_>>(), vec![41, 40]);

        let missing = repo.find_many(&[EquipmentId(99)]).await;
        assert!(matches!(missing, Err(RepositoryError::NotFound { entity: "equipment", .. })));
    }
}
