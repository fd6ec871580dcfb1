//! Labelled example utterances
//!
//! Loaded from a `;`-separated CSV with the header `service_id;service_name;intent`.
//! The name column is informational only; canonical names come from the catalog.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use intent_router_core::{ServiceCatalog, ServiceId};

use crate::ConfigError;

/// One labelled intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingExample {
    pub service_id: ServiceId,
    pub intent: String,
}

#[derive(Debug, Deserialize)]
struct TrainingRecord {
    service_id: String,
    #[serde(default)]
    #[allow(dead_code)]
    service_name: String,
    intent: String,
}

/// Load training examples from a CSV file
pub fn load_training_examples<P: AsRef<Path>>(
    path: P,
    catalog: &ServiceCatalog,
) -> Result<Vec<TrainingExample>, ConfigError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .map_err(|e| ConfigError::FileNotFound(format!("{}: {}", path.display(), e)))?;

    let examples = parse_training_examples(file, catalog)?;
    tracing::info!(
        path = %path.display(),
        count = examples.len(),
        "Loaded training examples"
    );
    Ok(examples)
}

/// Parse training examples from any reader
///
/// Rows with a non-numeric id, an id outside the catalog or an empty intent
/// are skipped.
pub fn parse_training_examples<R: Read>(
    reader: R,
    catalog: &ServiceCatalog,
) -> Result<Vec<TrainingExample>, ConfigError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut examples = Vec::new();
    for (line, record) in csv_reader.deserialize::<TrainingRecord>().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(line = line + 2, error = %e, "Skipping malformed training row");
                continue;
            },
        };

        let id = match record.service_id.parse::<u8>() {
            Ok(id) => ServiceId(id),
            Err(_) => {
                tracing::warn!(
                    line = line + 2,
                    service_id = %record.service_id,
                    "Skipping training row with non-numeric service id"
                );
                continue;
            },
        };

        if !catalog.contains(id) {
            tracing::debug!(
                line = line + 2,
                service_id = %id,
                "Skipping example for service outside catalog"
            );
            continue;
        }

        if record.intent.is_empty() {
            continue;
        }

        examples.push(TrainingExample {
            service_id: id,
            intent: record.intent,
        });
    }

    Ok(examples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "service_id;service_name;intent\n\
        1;Consulta Limite / Vencimento do cartão / Melhor dia de compra;Quanto tem disponível para usar\n\
        7;Cancelamento de cartão;cancelar cartão\n\
        17;Atualização de dados cadastrais;mudar meu endereço\n\
        abc;Quebrado;linha inválida\n\
        3;Segunda via de Fatura;\n\
        11;Perda e roubo; perdi meu cartão \n";

    #[test]
    fn test_parse_training_examples() {
        let catalog = ServiceCatalog::standard();
        let examples = parse_training_examples(SAMPLE.as_bytes(), &catalog).unwrap();

        assert_eq!(examples.len(), 3);
        assert_eq!(examples[0].service_id, ServiceId(1));
        assert_eq!(examples[1].intent, "cancelar cartão");
        assert_eq!(examples[2].intent, "perdi meu cartão");
    }

    #[test]
    fn test_extended_catalog_keeps_service_17() {
        let catalog = ServiceCatalog::extended();
        let examples = parse_training_examples(SAMPLE.as_bytes(), &catalog).unwrap();
        assert!(examples.iter().any(|e| e.service_id == ServiceId(17)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let examples = load_training_examples(file.path(), &ServiceCatalog::standard()).unwrap();
        assert_eq!(examples.len(), 3);
    }

    #[test]
    fn test_missing_file() {
        let result = load_training_examples("does/not/exist.csv", &ServiceCatalog::standard());
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }
}
