// Unit catalog: cached resolution of accommodation units

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::keys::{self, ttl, TTL_SHORT, TTL_SLUG};
use crate::cache::CacheFacade;
use crate::error::{BookingError, EntityKind, StoreError};
use crate::gateway::StoreGateway;
use crate::model::{AccommodationType, Unit};
use crate::store::schema::{unit_from_record, unit_props};
use crate::store::{Collection, Condition, Filter, Query};

#[derive(Clone)]
pub struct UnitCatalog {
    gateway: StoreGateway,
    cache: Arc<CacheFacade>,
}

impl UnitCatalog {
    pub fn new(gateway: StoreGateway, cache: Arc<CacheFacade>) -> Self {
        Self { gateway, cache }
    }

    pub async fn get_unit(&self, unit_id: &str) -> Result<Unit, BookingError> {
        let key = keys::unit_detail(unit_id);
        if let Some(unit) = self.cache.get::<Unit>(&key).await {
            return Ok(unit);
        }

        let record = self
            .gateway
            .retrieve(unit_id)
            .await
            .map_err(|e| BookingError::from_lookup(EntityKind::Unit, e))?;
        if record.collection != Collection::Units || record.archived {
            return Err(BookingError::NotFound {
                kind: EntityKind::Unit,
                id: unit_id.to_string(),
            });
        }

        let unit = unit_from_record(&record)?;
        self.cache.set(&key, &unit, ttl(TTL_SHORT)).await;
        Ok(unit)
    }

    pub async fn get_unit_by_slug(&self, slug: &str) -> Result<Unit, BookingError> {
        let key = keys::unit_slug(slug);
        if let Some(unit) = self.cache.get::<Unit>(&key).await {
            return Ok(unit);
        }

        let query = Query::new(Collection::Units).filter(Filter::property(
            unit_props::SLUG,
            Condition::TextEquals(slug.to_string()),
        ));
        let page = self.gateway.query_page(query.page_size(1)).await?;
        let record = page.records.first().ok_or_else(|| BookingError::NotFound {
            kind: EntityKind::Unit,
            id: slug.to_string(),
        })?;

        let unit = unit_from_record(record)?;
        self.cache.set(&key, &unit, ttl(TTL_SLUG)).await;
        Ok(unit)
    }

    // Every unit, optionally of one type; records that cannot be read are skipped
    pub async fn list_units(
        &self,
        accommodation: Option<AccommodationType>,
    ) -> Result<Vec<Unit>, StoreError> {
        let mut query = Query::new(Collection::Units).sort_ascending(unit_props::NAME);
        if let Some(accommodation) = accommodation {
            let label = match accommodation {
                AccommodationType::Exclusive => unit_props::TYPE_CABIN,
                AccommodationType::SharedCapacity => unit_props::TYPE_HOSTEL,
            };
            query = query.filter(Filter::property(
                unit_props::ACCOMMODATION_TYPE,
                Condition::SelectEquals(label.to_string()),
            ));
        }

        let records = self.gateway.query_all(query).await?;
        let units: Vec<Unit> = records
            .iter()
            .filter_map(|record| match unit_from_record(record) {
                Ok(unit) => Some(unit),
                Err(e) => {
                    warn!("Skipping unreadable unit: {e}");
                    None
                }
            })
            .collect();
        debug!("Listed {} units", units.len());
        Ok(units)
    }
}
