//! Prompt Building
//!
//! Constructs the classification prompt from the service catalog and a few
//! labelled example utterances per service.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use intent_router_core::{ServiceCatalog, ServiceId, FALLBACK_SERVICE_ID};

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Classification prompt
///
/// The system message is rendered once at construction; only the user turn
/// changes per request.
#[derive(Debug, Clone)]
pub struct ClassificationPrompt {
    system: String,
}

impl ClassificationPrompt {
    /// Build a prompt listing every catalog service
    ///
    /// `examples` may contain any number of utterances per service; at most
    /// `examples_per_service` are rendered for each.
    pub fn new<'a, I>(catalog: &ServiceCatalog, examples: I, examples_per_service: usize) -> Self
    where
        I: IntoIterator<Item = (ServiceId, &'a str)>,
    {
        let mut grouped: BTreeMap<ServiceId, Vec<&str>> = BTreeMap::new();
        for (id, text) in examples {
            let bucket = grouped.entry(id).or_default();
            if bucket.len() < examples_per_service && !bucket.contains(&text) {
                bucket.push(text);
            }
        }

        Self {
            system: render_system(catalog, &grouped),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system
    }

    /// Messages for one classification request
    pub fn messages(&self, intent: &str) -> Vec<Message> {
        vec![
            Message::system(self.system.clone()),
            Message::user(format!("Mensagem do cliente: \"{}\"", intent.replace('"', "'"))),
        ]
    }
}

fn render_system(catalog: &ServiceCatalog, examples: &BTreeMap<ServiceId, Vec<&str>>) -> String {
    let fallback = catalog.fallback();
    let mut out = String::with_capacity(2048);

    let _ = writeln!(
        out,
        "Você classifica mensagens de clientes de um banco em exatamente um dos {} serviços abaixo.",
        catalog.len()
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "SERVIÇOS:");

    for service in catalog.iter() {
        let _ = writeln!(out, "{}. {}", service.id, service.name);
        if let Some(samples) = examples.get(&service.id) {
            if !samples.is_empty() {
                let quoted: Vec<String> = samples.iter().map(|s| format!("\"{}\"", s)).collect();
                let _ = writeln!(out, "   exemplos: {}", quoted.join(", "));
            }
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "REGRAS:");
    let _ = writeln!(out, "- Use somente os ids listados; nunca invente serviços.");
    let _ = writeln!(
        out,
        "- Se a mensagem for ambígua ou fora de contexto, use o serviço {} ({}).",
        FALLBACK_SERVICE_ID, fallback.name
    );
    let _ = write!(
        out,
        "- Responda apenas com JSON: {{\"service_id\": <número>, \"service_name\": \"<nome>\"}}"
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_display() {
        assert_eq!(Role::System.to_string(), "system");
        assert_eq!(Role::User.to_string(), "user");
    }

    #[test]
    fn test_prompt_lists_every_service() {
        let catalog = ServiceCatalog::standard();
        let prompt =
            ClassificationPrompt::new(&catalog, std::iter::empty::<(ServiceId, &str)>(), 3);

        for service in catalog.iter() {
            assert!(prompt.system_prompt().contains(&format!("{}. {}", service.id, service.name)));
        }
        assert!(prompt.system_prompt().contains("service_id"));
        assert!(!prompt.system_prompt().contains("exemplos"));
    }

    #[test]
    fn test_prompt_limits_examples_per_service() {
        let catalog = ServiceCatalog::standard();
        let examples = vec![
            (ServiceId(7), "cancelar cartão"),
            (ServiceId(7), "cancelar cartão"),
            (ServiceId(7), "encerrar cartão"),
            (ServiceId(7), "não quero mais o cartão"),
            (ServiceId(7), "quero cancelar"),
        ];
        let prompt = ClassificationPrompt::new(&catalog, examples, 2);
        let text = prompt.system_prompt();

        assert!(text.contains("\"cancelar cartão\", \"encerrar cartão\""));
        assert!(!text.contains("não quero mais o cartão"));
    }

    #[test]
    fn test_messages() {
        let prompt = ClassificationPrompt::new(
            &ServiceCatalog::standard(),
            std::iter::empty::<(ServiceId, &str)>(),
            3,
        );
        let messages = prompt.messages("meu \"cartão\" sumiu");

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
        assert!(messages[1].content.contains("meu 'cartão' sumiu"));
    }
}
