use super::Resource;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    Text { max_len: usize },
    Integer { min: i64, max: i64 },
    Boolean,
    /// `YYYY-MM-DD`
    Date,
    Choice(&'static [&'static str]),
    /// Id of a record in another resource
    Reference(Resource),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Applied on full writes when the field is absent
    pub default: Option<&'static str>,
}

const fn text(name: &'static str, max_len: usize, required: bool) -> FieldSpec {
    FieldSpec { name, kind: FieldKind::Text { max_len }, required, default: None }
}

const fn flag(name: &'static str) -> FieldSpec {
    FieldSpec { name, kind: FieldKind::Boolean, required: false, default: Some("false") }
}

const fn date(name: &'static str, required: bool) -> FieldSpec {
    FieldSpec { name, kind: FieldKind::Date, required, default: None }
}

const fn choice(
    name: &'static str,
    choices: &'static [&'static str],
    required: bool,
    default: Option<&'static str>,
) -> FieldSpec {
    FieldSpec { name, kind: FieldKind::Choice(choices), required, default }
}

pub const TIPO_DADO: &[&str] = &["comuns", "sensiveis", "anonimizados", "pseudonimizados"];
pub const PLAN_STATUS: &[&str] = &["nao_iniciado", "andamento", "concluido", "atrasado"];
pub const CRITICIDADE: &[&str] = &["baixa", "media", "alta"];

/// Plan statuses that still count as open work
pub const OPEN_PLAN_STATUS: &[&str] = &["nao_iniciado", "andamento"];

const INVENTARIOS: &[FieldSpec] = &[
    text("unidade", 255, true),
    text("setor", 255, true),
    text("responsavel_email", 255, true),
    text("processo_negocio", 255, true),
    text("finalidade", 2000, true),
    text("dados_pessoais", 2000, true),
    choice("tipo_dado", TIPO_DADO, true, None),
    text("base_legal", 255, false),
    text("periodo_retencao", 100, false),
    flag("dados_menores"),
    flag("compartilhamento_terceiros"),
    text("nome_terceiro", 255, false),
    flag("transferencia_internacional"),
    text("observacoes", 2000, false),
];

const RISCOS: &[FieldSpec] = &[
    text("risco_fator", 500, true),
    text("processo", 255, false),
    text("setor", 255, false),
    text("matriz_filial", 255, false),
    FieldSpec { name: "probabilidade", kind: FieldKind::Integer { min: 1, max: 5 }, required: true, default: None },
    FieldSpec { name: "impacto", kind: FieldKind::Integer { min: 1, max: 5 }, required: true, default: None },
    text("resposta_risco", 2000, false),
];

const PLANOS_ACAO: &[FieldSpec] = &[
    FieldSpec { name: "risco", kind: FieldKind::Reference(Resource::Riscos), required: true, default: None },
    text("como", 2000, true),
    text("responsavel_execucao", 255, false),
    date("prazo", false),
    choice("status", PLAN_STATUS, false, Some("nao_iniciado")),
];

const INCIDENTES: &[FieldSpec] = &[
    text("descricao", 2000, true),
    text("fonte", 255, false),
    date("data_registro", true),
    date("data_encerramento", false),
    text("responsavel_analise", 255, false),
    text("decisoes_resolucao", 2000, false),
];

const CHECKLISTS: &[FieldSpec] = &[
    text("atividade", 255, true),
    text("descricao", 2000, false),
    flag("is_completed"),
];

const DOCUMENTOS: &[FieldSpec] = &[
    text("evidencia", 255, true),
    text("descricao", 2000, false),
    choice("criticidade", CRITICIDADE, false, None),
    date("data_revisao", false),
    date("proxima_revisao", false),
];

const CALENDAR_EVENT: &[FieldSpec] = &[
    text("title", 255, true),
    date("date", true),
    text("time", 5, false),
    text("description", 2000, false),
];

pub(super) fn fields_for(resource: Resource) -> &'static [FieldSpec] {
    match resource {
        Resource::Inventarios => INVENTARIOS,
        Resource::Riscos => RISCOS,
        Resource::PlanosAcao => PLANOS_ACAO,
        Resource::Incidentes => INCIDENTES,
        Resource::Checklists => CHECKLISTS,
        Resource::Documentos => DOCUMENTOS,
        Resource::CalendarEvent => CALENDAR_EVENT,
    }
}
