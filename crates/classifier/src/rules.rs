//! Regex rule classifier
//!
//! Rules are matched against the normalized intent (lowercase, no diacritics,
//! no punctuation), so patterns are written in plain ASCII. Order matters: the
//! first matching rule decides.

use regex::Regex;

use intent_router_config::RulesConfig;
use intent_router_core::{Service, ServiceCatalog, ServiceId};

use crate::normalize::{fold_diacritics, normalize};
use crate::ClassifierError;

/// Built-in rules as (service id, pattern), most specific first
const BUILTIN_RULES: &[(u8, &str)] = &[
    (
        2,
        r"\b(boleto|segunda via|2a via)\b.*\b(acordo|renegociac\w*|negociac\w*|parcelamento)\b|\b(acordo|renegociac\w*)\b.*\bboleto\b",
    ),
    (
        3,
        r"\b(segunda via|2a via|copia|boleto|codigo de barras)\b.*\bfatura\b|\bfatura\b.*\b(segunda via|2a via|copia|boleto|codigo de barras)\b",
    ),
    (16, r"\btoken\b|\bcodigo\b.*\bproposta\b"),
    (
        10,
        r"\b(esqueci|esqueceu|trocar|troca|alterar|mudar|redefinir|recuperar|cadastrar|nova)\b.*\bsenha\b|\bsenha\b.*\b(bloquead\w*|errad\w*|esqueci|trocar|nova)\b",
    ),
    (
        11,
        r"\b(perdi|perd[ei]u|perdid[oa]|perda|roub\w*|furt\w*|extravi\w*|sumiu)\b",
    ),
    (
        8,
        r"\bseguradoras?\b|\b(telefone|contato|numero)\b.*\bseguros?\b",
    ),
    (9, r"\bdesbloque\w*\b"),
    (
        7,
        r"\b(cancelar|cancelamento|cancela|encerrar)\b.*\bcartao\b|\bcartao\b.*\b(cancelar|cancelamento|encerrar)\b",
    ),
    (
        6,
        r"\b(aumentar|aumento|elevar|subir|ampliar)\b.*\blimite\b|\blimite\b.*\b(maior|aumentar|aumento)\b",
    ),
    (1, r"\blimite\b|\bvencimento\b|\bmelhor dia\b"),
    (
        4,
        r"\b(entrega|chegou|chega|rastre\w*|envio|enviado)\b.*\bcartao\b|\bcartao\b.*\b(entrega|chegou|chega|rastre\w*)\b",
    ),
    (
        5,
        r"\b(status|situacao)\b.*\bcartao\b|\bcartao\b.*\b(status|situacao|ativo|ativado)\b",
    ),
    (12, r"\bsaldo\b"),
    (
        13,
        r"\b(pagar|pagamento|quitar)\b.*\b(contas?|boletos?|agua|luz)\b",
    ),
    (
        14,
        r"\b(reclamac\w*|reclamar|reclamo|queixa|insatisfeit\w*|absurdo)\b",
    ),
    (
        17,
        r"\b(atualizar|atualizacao|alterar|mudar|corrigir)\b.*\b(dados|cadastro|cadastrais|endereco|e ?mail|telefone)\b",
    ),
    (
        15,
        r"\b(atendente|humano|falar com (alguem|uma pessoa)|transferir)\b",
    ),
];

/// Rule hit
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub service: Service,
    /// Index of the rule that fired
    pub rule_index: usize,
}

struct CompiledRule {
    service_id: ServiceId,
    regex: Regex,
}

/// Ordered regex rules mapping intents to services
pub struct RuleClassifier {
    rules: Vec<CompiledRule>,
    catalog: ServiceCatalog,
}

impl RuleClassifier {
    /// Built-in rule set
    pub fn builtin(catalog: &ServiceCatalog) -> Result<Self, ClassifierError> {
        Self::compile(BUILTIN_RULES.iter().copied(), catalog)
    }

    /// Rules loaded from a rule file, replacing the built-in set
    pub fn from_config(
        config: &RulesConfig,
        catalog: &ServiceCatalog,
    ) -> Result<Self, ClassifierError> {
        Self::compile(
            config
                .rules
                .iter()
                .map(|rule| (rule.service_id, rule.pattern.as_str())),
            catalog,
        )
    }

    fn compile<'a, I>(rules: I, catalog: &ServiceCatalog) -> Result<Self, ClassifierError>
    where
        I: IntoIterator<Item = (u8, &'a str)>,
    {
        let mut compiled = Vec::new();

        for (id, pattern) in rules {
            let service_id = ServiceId(id);
            if !catalog.contains(service_id) {
                tracing::warn!(
                    service_id = id,
                    pattern,
                    "Dropping rule for service outside the catalog"
                );
                continue;
            }

            let regex = Regex::new(&format!("(?i){}", fold_diacritics(pattern))).map_err(|e| {
                ClassifierError::InvalidRule {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                }
            })?;
            compiled.push(CompiledRule { service_id, regex });
        }

        tracing::debug!(rules = compiled.len(), "Compiled classification rules");

        Ok(Self {
            rules: compiled,
            catalog: catalog.clone(),
        })
    }

    /// First rule matching the intent
    pub fn classify(&self, text: &str) -> Option<RuleMatch> {
        self.classify_normalized(&normalize(text))
    }

    /// Same as [`classify`](Self::classify) for text already passed through [`normalize`]
    pub fn classify_normalized(&self, normalized: &str) -> Option<RuleMatch> {
        if normalized.is_empty() {
            return None;
        }

        self.rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.regex.is_match(normalized))
            .and_then(|(rule_index, rule)| {
                self.catalog.get(rule.service_id).map(|service| RuleMatch {
                    service: service.clone(),
                    rule_index,
                })
            })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
