//! REST resource catalogue and payload validation

use serde::{Deserialize, Serialize};

pub mod schema;
pub mod validate;

pub use schema::{FieldKind, FieldSpec};
pub use validate::{validate_payload, ValidationErrors, WriteMode};

/// Every CRUD collection exposed under `/{path}/`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resource {
    Inventarios,
    Riscos,
    PlanosAcao,
    Incidentes,
    Checklists,
    Documentos,
    CalendarEvent,
}

impl Resource {
    pub const ALL: [Resource; 7] = [
        Resource::Inventarios,
        Resource::Riscos,
        Resource::PlanosAcao,
        Resource::Incidentes,
        Resource::Checklists,
        Resource::Documentos,
        Resource::CalendarEvent,
    ];

    /// URL segment, also used as the storage discriminator
    pub fn path(&self) -> &'static str {
        match self {
            Resource::Inventarios => "inventarios",
            Resource::Riscos => "riscos",
            Resource::PlanosAcao => "planos-acao",
            Resource::Incidentes => "incidentes",
            Resource::Checklists => "checklists",
            Resource::Documentos => "documentos",
            Resource::CalendarEvent => "calendarevent",
        }
    }

    pub fn from_path(raw: &str) -> Option<Self> {
        let raw = raw.trim_matches('/');
        Self::ALL.iter().copied().find(|r| r.path() == raw)
    }

    /// Name used for activity log entries
    pub fn audit_module(&self) -> &'static str {
        match self {
            Resource::Inventarios => "inventario",
            Resource::Riscos => "riscos",
            Resource::PlanosAcao => "plano-acao",
            Resource::Incidentes => "incidentes",
            Resource::Checklists => "checklist",
            Resource::Documentos => "documentos",
            Resource::CalendarEvent => "calendario",
        }
    }

    /// Field the creator id is exposed under
    pub fn owner_field(&self) -> &'static str {
        match self {
            Resource::CalendarEvent => "user",
            _ => "criado_por",
        }
    }

    /// Records only visible to and editable by their owner
    pub fn is_owner_scoped(&self) -> bool {
        matches!(self, Resource::CalendarEvent)
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        schema::fields_for(*self)
    }

    pub fn search_fields(&self) -> &'static [&'static str] {
        match self {
            Resource::Inventarios => &[
                "unidade",
                "setor",
                "responsavel_email",
                "processo_negocio",
                "finalidade",
                "dados_pessoais",
            ],
            Resource::Riscos => &["risco_fator", "processo", "setor", "matriz_filial"],
            Resource::PlanosAcao => &["como", "responsavel_execucao"],
            Resource::Incidentes => &["descricao", "fonte", "responsavel_analise", "decisoes_resolucao"],
            Resource::Checklists => &["atividade", "descricao"],
            Resource::Documentos => &["evidencia", "descricao", "criticidade"],
            Resource::CalendarEvent => &["title", "description"],
        }
    }

    /// Ordering applied when the client does not ask for one
    pub fn default_ordering(&self) -> &'static str {
        match self {
            Resource::Inventarios => "-data_criacao",
            Resource::Riscos => "-data_criacao",
            Resource::PlanosAcao => "prazo",
            Resource::Incidentes => "-data_registro",
            Resource::Checklists => "id",
            Resource::Documentos => "-data_criacao",
            Resource::CalendarEvent => "date",
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// Risk level band for a probability x impact score
pub fn risk_level(score: i64) -> Option<&'static str> {
    match score {
        s if s <= 0 => None,
        s if s <= 6 => Some("Baixo"),
        s if s <= 12 => Some("Médio"),
        s if s <= 16 => Some("Alto"),
        _ => Some("Crítico"),
    }
}

/// Registration number for an incident, e.g. `INC-2025-0007`
pub fn incident_number(year: i32, id: i64) -> String {
    format!("INC-{}-{:04}", year, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_round_trip() {
        for r in Resource::ALL {
            assert_eq!(Resource::from_path(r.path()), Some(r));
        }
        assert_eq!(Resource::from_path("/planos-acao/"), Some(Resource::PlanosAcao));
        assert_eq!(Resource::from_path("users"), None);
    }

    #[test]
    fn risk_bands() {
        assert_eq!(risk_level(0), None);
        assert_eq!(risk_level(1), Some("Baixo"));
        assert_eq!(risk_level(6), Some("Baixo"));
        assert_eq!(risk_level(7), Some("Médio"));
        assert_eq!(risk_level(12), Some("Médio"));
        assert_eq!(risk_level(16), Some("Alto"));
        assert_eq!(risk_level(20), Some("Crítico"));
        assert_eq!(risk_level(25), Some("Crítico"));
    }

    #[test]
    fn incident_numbers_are_zero_padded() {
        assert_eq!(incident_number(2025, 7), "INC-2025-0007");
        assert_eq!(incident_number(2024, 12345), "INC-2024-12345");
    }

    #[test]
    fn only_calendar_is_owner_scoped() {
        let scoped: Vec<_> = Resource::ALL.iter().filter(|r| r.is_owner_scoped()).collect();
        assert_eq!(scoped, vec![&Resource::CalendarEvent]);
        assert_eq!(Resource::CalendarEvent.owner_field(), "user");
    }
}
