use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Seed contract: every standard catalog row by id, name and category.
const SEED_ITEMS: &[(i64, &str, &str)] = &[
    (1, "Escalera Telescópica 3m", "escaleras"),
    (2, "Escalera Extensible 5m", "escaleras"),
    (3, "Andamio Tubular 4m", "andamios"),
    (4, "Andamio Multidireccional 8m", "andamios"),
    (5, "Andamio Torre Móvil 10m", "andamios"),
    (6, "Andamio Colgante 12m", "andamios"),
    (7, "Elevador Tijera Eléctrico 6m", "elevadores"),
    (8, "Elevador Tijera Diésel 12m", "elevadores"),
    (9, "Elevador Articulado 14m", "elevadores"),
    (10, "Elevador Telescópico 16m", "elevadores"),
    (11, "Elevador Oruga 18m", "elevadores"),
    (12, "Elevador Araña 20m", "elevadores"),
    (13, "Plataforma Suspendida 2 Puntos", "equipos_especializados"),
    (14, "Escalera de Bomberos 25m", "equipos_especializados"),
    (15, "Grúa Canasta 30m", "equipos_especializados"),
    (16, "Andamio Europeo Certificado 15m", "andamios"),
];

/// Standard rental catalog.
///
/// Loading is idempotent: rows whose id already exists are left as they are, so operator edits
/// to prices or availability survive a re-seed.
pub struct CatalogSeed;

impl CatalogSeed {
    pub const SQL: &str = include_str!("../../../config/fixtures/equipment_catalog.sql");

    pub fn item_count() -> usize {
        SEED_ITEMS.len()
    }

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let before = Self::present_count(pool).await?;

        let mut tx = pool.begin().await?;
        sqlx::raw_sql(Self::SQL).execute(&mut *tx).await?;
        tx.commit().await?;

        let after = Self::present_count(pool).await?;
        Ok(SeedResult {
            inserted: usize::try_from(after - before).unwrap_or_default(),
            total: SEED_ITEMS.len(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::with_capacity(SEED_ITEMS.len());
        for (id, name, category) in SEED_ITEMS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM equipment WHERE id = ?1 AND name = ?2 AND category = ?3)",
            )
            .bind(*id)
            .bind(*name)
            .bind(*category)
            .fetch_one(pool)
            .await?;
            checks.push((*name, present == 1));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    async fn present_count(pool: &DbPool) -> Result<i64, RepositoryError> {
        let ids = SEED_ITEMS.iter().map(|(id, _, _)| id.to_string()).collect::<Vec<_>>().join(", ");
        let count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(1) FROM equipment WHERE id IN ({ids})"))
                .fetch_one(pool)
                .await?;
        Ok(count)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub inserted: usize,
    pub total: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

impl VerificationResult {
    pub fn missing(&self) -> Vec<&'static str> {
        self.checks.iter().filter(|(_, present)| !present).map(|(name, _)| *name).collect()
    }
}
