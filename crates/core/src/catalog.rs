//! Customer-service catalog
//!
//! The fixed set of services an intent can be routed to. Service names handed
//! back to clients always come from here, never from a model reply.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::CatalogError;

/// Service every failed or ambiguous classification is routed to
pub const FALLBACK_SERVICE_ID: ServiceId = ServiceId(15);

const STANDARD_SERVICES: [(u8, &str); 16] = [
    (1, "Consulta Limite / Vencimento do cartão / Melhor dia de compra"),
    (2, "Segunda via de boleto de acordo"),
    (3, "Segunda via de Fatura"),
    (4, "Status de Entrega do Cartão"),
    (5, "Status de cartão"),
    (6, "Solicitação de aumento de limite"),
    (7, "Cancelamento de cartão"),
    (8, "Telefones de seguradoras"),
    (9, "Desbloqueio de Cartão"),
    (10, "Esqueceu senha / Troca de senha"),
    (11, "Perda e roubo"),
    (12, "Consulta do Saldo"),
    (13, "Pagamento de contas"),
    (14, "Reclamações"),
    (15, "Atendimento humano"),
    (16, "Token de proposta"),
];

const EXTENDED_SERVICES: [(u8, &str); 1] = [(17, "Atualização de dados cadastrais")];

static STANDARD: Lazy<ServiceCatalog> =
    Lazy::new(|| ServiceCatalog::from_table(&STANDARD_SERVICES, &[]));
static EXTENDED: Lazy<ServiceCatalog> =
    Lazy::new(|| ServiceCatalog::from_table(&STANDARD_SERVICES, &EXTENDED_SERVICES));

/// Numeric service identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(pub u8);

impl ServiceId {
    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for ServiceId {
    fn from(id: u8) -> Self {
        Self(id)
    }
}

/// A routable customer service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
}

/// Ordered catalog of services
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCatalog {
    services: BTreeMap<ServiceId, Service>,
}

impl ServiceCatalog {
    /// The 16-service catalog
    pub fn standard() -> Self {
        STANDARD.clone()
    }

    /// Standard catalog plus registration-data updates (17)
    pub fn extended() -> Self {
        EXTENDED.clone()
    }

    /// Build a catalog from an arbitrary list of services
    ///
    /// The list must contain the fallback service and must not repeat ids.
    pub fn from_services(services: Vec<Service>) -> Result<Self, CatalogError> {
        let mut map = BTreeMap::new();
        for service in services {
            let id = service.id;
            if map.insert(id, service).is_some() {
                return Err(CatalogError::DuplicateService(id.0));
            }
        }
        if !map.contains_key(&FALLBACK_SERVICE_ID) {
            return Err(CatalogError::MissingFallback(FALLBACK_SERVICE_ID.0));
        }
        Ok(Self { services: map })
    }

    fn from_table(base: &[(u8, &str)], extra: &[(u8, &str)]) -> Self {
        let services = base
            .iter()
            .chain(extra.iter())
            .map(|(id, name)| {
                (
                    ServiceId(*id),
                    Service {
                        id: ServiceId(*id),
                        name: (*name).to_string(),
                    },
                )
            })
            .collect();
        Self { services }
    }

    pub fn get(&self, id: ServiceId) -> Option<&Service> {
        self.services.get(&id)
    }

    pub fn contains(&self, id: ServiceId) -> bool {
        self.services.contains_key(&id)
    }

    /// Canonical name of a service
    pub fn name_of(&self, id: ServiceId) -> Option<&str> {
        self.services.get(&id).map(|s| s.name.as_str())
    }

    /// Look up a service, failing on unknown ids
    pub fn lookup(&self, id: ServiceId) -> Result<&Service, CatalogError> {
        self.get(id).ok_or(CatalogError::UnknownService(id.0))
    }

    /// The human-attendant service
    pub fn fallback(&self) -> Service {
        self.services
            .get(&FALLBACK_SERVICE_ID)
            .cloned()
            .unwrap_or_else(|| Service {
                id: FALLBACK_SERVICE_ID,
                name: "Atendimento humano".to_string(),
            })
    }

    /// Canonical service for `id`, or the fallback when `id` is unknown
    pub fn resolve(&self, id: ServiceId) -> Service {
        self.get(id).cloned().unwrap_or_else(|| self.fallback())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = ServiceId> + '_ {
        self.services.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
