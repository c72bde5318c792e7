//! # Connector Repository
//!
//! Connector rows with sealed credentials and the sync bookkeeping columns.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::crypto::{CryptoError, CryptoKey, credentials_aad, seal_credentials};
use crate::error::PipelineError;
use crate::models::connector::{self, ActiveModel, ConnectorKind, ConnectorStatus, Entity, Model};

/// Fields of a connector registration
#[derive(Debug, Clone)]
pub struct NewConnector {
    pub kind: ConnectorKind,
    pub shop_domain: String,
    pub credentials: JsonValue,
    pub currency: Option<String>,
    pub status: ConnectorStatus,
}

/// Repository for connector database operations
pub struct ConnectorRepository {
    db: DatabaseConnection,
}

impl ConnectorRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Inserts a connector, sealing its credentials when a key is configured.
    pub async fn create(
        &self,
        organization_id: Uuid,
        new: NewConnector,
        crypto_key: Option<&CryptoKey>,
    ) -> Result<Model, PipelineError> {
        let shop_domain = normalize_domain(&new.shop_domain);
        if shop_domain.is_empty() {
            return Err(PipelineError::BadPayload("shop_domain must not be empty".into()));
        }

        let sealed = seal(organization_id, new.kind, &shop_domain, &new.credentials, crypto_key)?;

        let now = Utc::now().fixed_offset();
        let connector = ActiveModel {
            id: Set(Uuid::new_v4()),
            organization_id: Set(organization_id),
            kind: Set(new.kind.as_str().to_string()),
            shop_domain: Set(shop_domain),
            credentials_ciphertext: Set(sealed),
            currency: Set(new.currency.map(|c| c.to_ascii_uppercase())),
            status: Set(new.status.as_str().to_string()),
            last_sync_at: Set(None),
            sync_cursor: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await?;

        tracing::info!(
            connector_id = %connector.id,
            kind = %connector.kind,
            shop_domain = %connector.shop_domain,
            "Connector registered"
        );
        Ok(connector)
    }

    /// Brings an uninstalled connector back with fresh credentials and a cleared sync cursor.
    /// Stored products stay as they were until the next webhook or sync touches them.
    pub async fn reinstall(
        &self,
        existing: Model,
        new: NewConnector,
        crypto_key: Option<&CryptoKey>,
    ) -> Result<Model, PipelineError> {
        let sealed = seal(
            existing.organization_id,
            new.kind,
            &existing.shop_domain,
            &new.credentials,
            crypto_key,
        )?;
        let mut active: ActiveModel = existing.into();
        active.credentials_ciphertext = Set(sealed);
        if let Some(currency) = new.currency {
            active.currency = Set(Some(currency.to_ascii_uppercase()));
        }
        active.status = Set(new.status.as_str().to_string());
        active.sync_cursor = Set(None);
        active.updated_at = Set(Utc::now().fixed_offset());
        let connector = active.update(&self.db).await?;

        tracing::info!(
            connector_id = %connector.id,
            status = %connector.status,
            "Connector reinstalled"
        );
        Ok(connector)
    }

    pub async fn find(
        &self,
        organization_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find_by_id(id)
            .filter(connector::Column::OrganizationId.eq(organization_id))
            .one(&self.db)
            .await
    }

    /// Finds the connector of `kind` for a shop domain; matching is case-insensitive.
    pub async fn find_by_domain(
        &self,
        organization_id: Uuid,
        kind: ConnectorKind,
        shop_domain: &str,
    ) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(connector::Column::OrganizationId.eq(organization_id))
            .filter(connector::Column::Kind.eq(kind.as_str()))
            .filter(connector::Column::ShopDomain.eq(normalize_domain(shop_domain)))
            .one(&self.db)
            .await
    }

    pub async fn list(&self, organization_id: Uuid) -> Result<Vec<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(connector::Column::OrganizationId.eq(organization_id))
            .order_by_asc(connector::Column::CreatedAt)
            .all(&self.db)
            .await
    }

    pub async fn set_status(
        &self,
        connector: Model,
        status: ConnectorStatus,
    ) -> Result<Model, sea_orm::DbErr> {
        let mut active: ActiveModel = connector.into();
        active.status = Set(status.as_str().to_string());
        active.updated_at = Set(Utc::now().fixed_offset());
        active.update(&self.db).await
    }

    pub async fn set_currency(
        &self,
        connector: Model,
        currency: String,
    ) -> Result<Model, sea_orm::DbErr> {
        let mut active: ActiveModel = connector.into();
        active.currency = Set(Some(currency.to_ascii_uppercase()));
        active.updated_at = Set(Utc::now().fixed_offset());
        active.update(&self.db).await
    }

    /// Records a finished pull sync. `cursor` is where a truncated listing should resume.
    pub async fn record_sync(
        &self,
        connector_id: Uuid,
        cursor: Option<String>,
    ) -> Result<(), sea_orm::DbErr> {
        let now = Utc::now().fixed_offset();
        ActiveModel {
            id: Set(connector_id),
            last_sync_at: Set(Some(now)),
            sync_cursor: Set(cursor),
            updated_at: Set(now),
            ..Default::default()
        }
        .update(&self.db)
        .await?;
        Ok(())
    }
}

fn seal(
    organization_id: Uuid,
    kind: ConnectorKind,
    shop_domain: &str,
    credentials: &JsonValue,
    crypto_key: Option<&CryptoKey>,
) -> Result<Option<Vec<u8>>, PipelineError> {
    if credentials.is_null() {
        return Ok(None);
    }
    let aad = credentials_aad(organization_id, kind.as_str(), shop_domain);
    seal_credentials(crypto_key, &aad, credentials)
        .map(Some)
        .map_err(|e: CryptoError| PipelineError::BadPayload(e.to_string()))
}

/// Host names are lowercased; document URLs keep their case. Trailing slashes are dropped.
pub fn normalize_domain(shop_domain: &str) -> String {
    let trimmed = shop_domain.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        trimmed.to_ascii_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosts_are_lowercased_and_urls_kept() {
        assert_eq!(normalize_domain(" Demo.MyShopify.com/ "), "demo.myshopify.com");
        assert_eq!(
            normalize_domain("https://files.example/Catalog.csv"),
            "https://files.example/Catalog.csv"
        );
    }
}
