//! Compliance dashboard aggregation.
//!
//! Everything is computed from the records in the store; `today` is passed in
//! so the date windows (overdue plans, documents due in 30 days) are testable.

use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use serde_json::Value;

use crate::database::models::{LoginActivity, Record, User};
use crate::database::{DatabaseError, Store};
use crate::resources::{risk_level, Resource};
use crate::services::overdue::is_overdue;

const TOP_RISKS: usize = 5;
const RECENT_LOGINS: usize = 20;
pub const DEFAULT_RANKING_LIMIT: usize = 10;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Kpis {
    pub conformidade: f64,
    pub riscos_mapeados: usize,
    pub acoes_atrasadas: usize,
    pub docs_vencendo30d: usize,
    /// Incidents still open (no closing date)
    pub alertas: usize,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct NameValue {
    pub name: String,
    pub value: usize,
}

#[derive(Debug, Serialize)]
pub struct SetorCount {
    pub setor: String,
    pub quantidade: usize,
}

#[derive(Debug, Serialize)]
pub struct TopRisk {
    pub id: i64,
    pub titulo: String,
    pub score: i64,
    pub setor: String,
    pub owner: String,
}

#[derive(Debug, Serialize)]
pub struct DocumentDue {
    pub id: i64,
    pub evidencia: String,
    pub criticidade: Option<String>,
    pub proxima_revisao: String,
}

#[derive(Debug, Default, Serialize)]
pub struct ActionMonth {
    pub mes: String,
    pub planejadas: usize,
    pub andamento: usize,
    pub concluidas: usize,
    pub atrasadas: usize,
}

#[derive(Debug, Serialize)]
pub struct IncidentMonth {
    pub mes: String,
    pub qtd: usize,
}

#[derive(Debug, Serialize)]
pub struct RecentLogin {
    pub usuario: String,
    pub funcao: String,
    pub quando: String,
}

#[derive(Debug, Serialize)]
pub struct UserRanking {
    pub nome: String,
    pub acessos: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Maturity {
    pub indice: f64,
    pub percent_acoes: f64,
    pub percent_checklist: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub kpis: Kpis,
    pub riscos_distribuicao: Vec<NameValue>,
    pub riscos_por_setor: Vec<SetorCount>,
    pub top_riscos: Vec<TopRisk>,
    pub acoes_status: Vec<NameValue>,
    pub acoes_timeline: Vec<ActionMonth>,
    pub documentos_vencimentos: Vec<DocumentDue>,
    pub incidentes_timeline: Vec<IncidentMonth>,
    pub logins_recentes: Vec<RecentLogin>,
    pub ranking_usuarios: Vec<UserRanking>,
    pub indice_maturidade: Maturity,
}

/// Snapshot of everything the dashboard reads
#[derive(Debug, Default)]
pub struct DashboardInput {
    pub checklists: Vec<Record>,
    pub plans: Vec<Record>,
    pub documents: Vec<Record>,
    pub risks: Vec<Record>,
    pub incidents: Vec<Record>,
    pub logins: Vec<LoginActivity>,
    pub users: Vec<User>,
}

impl DashboardInput {
    pub async fn load(store: &dyn Store) -> Result<Self, DatabaseError> {
        Ok(Self {
            checklists: store.list_records(Resource::Checklists).await?,
            plans: store.list_records(Resource::PlanosAcao).await?,
            documents: store.list_records(Resource::Documentos).await?,
            risks: store.list_records(Resource::Riscos).await?,
            incidents: store.list_records(Resource::Incidentes).await?,
            logins: store.list_logins().await?,
            users: store.list_users().await?,
        })
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn text(record: &Record, field: &str) -> String {
    record.str_field(field).unwrap_or_default().to_string()
}

/// Plan status as shown on the dashboard: open plans past their deadline count as late
fn effective_status(plan: &Record, today: NaiveDate) -> &str {
    if is_overdue(plan, today) {
        return "atrasado";
    }
    plan.str_field("status").unwrap_or("nao_iniciado")
}

impl Dashboard {
    pub fn build(input: &DashboardInput, today: NaiveDate, ranking_limit: usize) -> Self {
        let in_30_days = today + Duration::days(30);

        let checklist_done = input
            .checklists
            .iter()
            .filter(|c| c.field("is_completed").and_then(Value::as_bool).unwrap_or(false))
            .count();
        let p_checklist = percent(checklist_done, input.checklists.len());

        let plans_done = input
            .plans
            .iter()
            .filter(|p| p.str_field("status") == Some("concluido"))
            .count();
        let p_plans = percent(plans_done, input.plans.len());

        let docs_valid = input
            .documents
            .iter()
            .filter(|d| d.date_field("proxima_revisao").is_some_and(|r| r >= today))
            .count();
        let p_docs = percent(docs_valid, input.documents.len());

        let mut due: Vec<&Record> = input
            .documents
            .iter()
            .filter(|d| {
                d.date_field("proxima_revisao")
                    .is_some_and(|r| r >= today && r <= in_30_days)
            })
            .collect();
        due.sort_by_key(|d| (d.date_field("proxima_revisao"), d.id));

        let kpis = Kpis {
            conformidade: round1(p_checklist * 0.5 + p_plans * 0.3 + p_docs * 0.2),
            riscos_mapeados: input.risks.len(),
            acoes_atrasadas: input.plans.iter().filter(|p| is_overdue(p, today)).count(),
            docs_vencendo30d: due.len(),
            alertas: input
                .incidents
                .iter()
                .filter(|i| i.date_field("data_encerramento").is_none())
                .count(),
        };

        Self {
            kpis,
            riscos_distribuicao: risk_distribution(&input.risks),
            riscos_por_setor: risks_by_sector(&input.risks),
            top_riscos: top_risks(&input.risks),
            acoes_status: action_status(&input.plans, today),
            acoes_timeline: action_timeline(&input.plans, today),
            documentos_vencimentos: due
                .into_iter()
                .map(|d| DocumentDue {
                    id: d.id,
                    evidencia: text(d, "evidencia"),
                    criticidade: d.str_field("criticidade").map(str::to_string),
                    proxima_revisao: text(d, "proxima_revisao"),
                })
                .collect(),
            incidentes_timeline: incident_timeline(&input.incidents),
            logins_recentes: recent_logins(&input.logins, &input.users),
            ranking_usuarios: user_ranking(&input.logins, &input.users, ranking_limit),
            indice_maturidade: Maturity {
                indice: round1(p_checklist * 0.6 + p_plans * 0.4),
                percent_acoes: round1(p_plans),
                percent_checklist: round1(p_checklist),
            },
        }
    }
}

fn risk_score(risk: &Record) -> Option<i64> {
    risk.field("pontuacao").and_then(Value::as_i64)
}

fn risk_distribution(risks: &[Record]) -> Vec<NameValue> {
    let bands = ["Baixo", "Médio", "Alto", "Crítico"];
    let mut counts = [0usize; 4];
    for level in risks.iter().filter_map(|r| risk_level(risk_score(r).unwrap_or(0))) {
        if let Some(i) = bands.iter().position(|b| *b == level) {
            counts[i] += 1;
        }
    }
    bands
        .iter()
        .zip(counts)
        .map(|(name, value)| NameValue { name: name.to_string(), value })
        .collect()
}

fn risks_by_sector(risks: &[Record]) -> Vec<SetorCount> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for risk in risks {
        let setor = risk
            .str_field("setor")
            .filter(|s| !s.is_empty())
            .unwrap_or("Não informado");
        *counts.entry(setor.to_string()).or_default() += 1;
    }
    let mut out: Vec<SetorCount> = counts
        .into_iter()
        .map(|(setor, quantidade)| SetorCount { setor, quantidade })
        .collect();
    out.sort_by(|a, b| b.quantidade.cmp(&a.quantidade).then_with(|| a.setor.cmp(&b.setor)));
    out
}

fn top_risks(risks: &[Record]) -> Vec<TopRisk> {
    let mut scored: Vec<(&Record, i64)> = risks.iter().filter_map(|r| risk_score(r).map(|s| (r, s))).collect();
    scored.sort_by(|(a, sa), (b, sb)| sb.cmp(sa).then_with(|| a.id.cmp(&b.id)));
    scored
        .into_iter()
        .take(TOP_RISKS)
        .map(|(r, score)| TopRisk {
            id: r.id,
            titulo: text(r, "risco_fator"),
            score,
            setor: text(r, "setor"),
            owner: text(r, "processo"),
        })
        .collect()
}

const STATUS_LABELS: [(&str, &str); 4] = [
    ("concluido", "Concluído"),
    ("andamento", "Em andamento"),
    ("nao_iniciado", "Não iniciado"),
    ("atrasado", "Atrasado"),
];

fn action_status(plans: &[Record], today: NaiveDate) -> Vec<NameValue> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for plan in plans {
        *counts.entry(effective_status(plan, today)).or_default() += 1;
    }
    STATUS_LABELS
        .iter()
        .map(|(key, label)| NameValue {
            name: label.to_string(),
            value: counts.get(key).copied().unwrap_or(0),
        })
        .collect()
}

fn action_timeline(plans: &[Record], today: NaiveDate) -> Vec<ActionMonth> {
    let mut months: BTreeMap<String, ActionMonth> = BTreeMap::new();
    for plan in plans {
        let prazo = plan.date_field("prazo").unwrap_or(today);
        let mes = prazo.format("%Y-%m").to_string();
        let bucket = months.entry(mes.clone()).or_insert_with(|| ActionMonth { mes, ..Default::default() });
        bucket.planejadas += 1;
        match effective_status(plan, today) {
            "concluido" => bucket.concluidas += 1,
            "andamento" => bucket.andamento += 1,
            "atrasado" => bucket.atrasadas += 1,
            _ => {}
        }
    }
    months.into_values().collect()
}

fn incident_timeline(incidents: &[Record]) -> Vec<IncidentMonth> {
    let mut months: BTreeMap<String, usize> = BTreeMap::new();
    for date in incidents.iter().filter_map(|i| i.date_field("data_registro")) {
        *months.entry(date.format("%Y-%m").to_string()).or_default() += 1;
    }
    months.into_iter().map(|(mes, qtd)| IncidentMonth { mes, qtd }).collect()
}

fn display_name(user: Option<&User>, fallback_email: &str) -> String {
    match user {
        Some(u) if !u.full_name().is_empty() => u.full_name(),
        Some(u) => u.email.clone(),
        None => fallback_email.to_string(),
    }
}

fn recent_logins(logins: &[LoginActivity], users: &[User]) -> Vec<RecentLogin> {
    let by_id: HashMap<i64, &User> = users.iter().map(|u| (u.id, u)).collect();
    logins
        .iter()
        .take(RECENT_LOGINS)
        .map(|l| {
            let user = by_id.get(&l.user_id).copied();
            RecentLogin {
                usuario: display_name(user, &l.email),
                funcao: user.map(|u| u.role.as_str()).unwrap_or("-").to_string(),
                quando: l.logged_at.format("%d/%m/%Y %H:%M").to_string(),
            }
        })
        .collect()
}

fn user_ranking(logins: &[LoginActivity], users: &[User], limit: usize) -> Vec<UserRanking> {
    let by_id: HashMap<i64, &User> = users.iter().map(|u| (u.id, u)).collect();
    let mut counts: HashMap<i64, (usize, &str)> = HashMap::new();
    for l in logins {
        counts.entry(l.user_id).or_insert((0, l.email.as_str())).0 += 1;
    }

    let mut ranking: Vec<UserRanking> = counts
        .into_iter()
        .map(|(id, (acessos, email))| {
            let nome = match by_id.get(&id) {
                Some(u) if !u.first_name.is_empty() => u.first_name.clone(),
                Some(u) => u.email.clone(),
                None => email.to_string(),
            };
            UserRanking { nome, acessos }
        })
        .collect();
    ranking.sort_by(|a, b| b.acessos.cmp(&a.acessos).then_with(|| a.nome.cmp(&b.nome)));
    ranking.truncate(limit);
    ranking
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::Role;
    use chrono::Utc;
    use serde_json::{json, Map};

    fn rec(resource: Resource, id: i64, v: Value) -> Record {
        let data: Map<String, Value> = v.as_object().cloned().unwrap();
        Record {
            id,
            resource,
            owner_id: None,
            data,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn login(id: i64, user: &User) -> LoginActivity {
        LoginActivity {
            id,
            user_id: user.id,
            email: user.email.clone(),
            ip_address: None,
            user_agent: None,
            logged_at: Utc::now(),
        }
    }

    fn sample() -> DashboardInput {
        let mut alice = crate::testing::user(1, "alice@example.com", Role::Dpo);
        alice.first_name = "Alice".into();
        let bob = crate::testing::user(2, "bob@example.com", Role::Gerente);

        DashboardInput {
            checklists: vec![
                rec(Resource::Checklists, 1, json!({"atividade": "a", "is_completed": true})),
                rec(Resource::Checklists, 2, json!({"atividade": "b", "is_completed": false})),
            ],
            plans: vec![
                rec(Resource::PlanosAcao, 1, json!({"risco": 1, "status": "concluido", "prazo": "2025-01-10"})),
                rec(Resource::PlanosAcao, 2, json!({"risco": 1, "status": "andamento", "prazo": "2025-01-20"})),
                rec(Resource::PlanosAcao, 3, json!({"risco": 2, "status": "nao_iniciado", "prazo": "2025-03-01"})),
                rec(Resource::PlanosAcao, 4, json!({"risco": 2, "status": "andamento", "prazo": "2025-03-05"})),
            ],
            documents: vec![
                rec(Resource::Documentos, 1, json!({"evidencia": "Política", "proxima_revisao": "2025-02-20"})),
                rec(Resource::Documentos, 2, json!({"evidencia": "Contrato", "proxima_revisao": "2025-01-01"})),
                rec(Resource::Documentos, 3, json!({"evidencia": "RIPD", "proxima_revisao": "2025-06-01"})),
                rec(Resource::Documentos, 4, json!({"evidencia": "Termo"})),
            ],
            risks: vec![
                rec(Resource::Riscos, 1, json!({"risco_fator": "Vazamento", "setor": "TI", "processo": "Backup", "pontuacao": 20})),
                rec(Resource::Riscos, 2, json!({"risco_fator": "Acesso", "setor": "TI", "pontuacao": 4})),
                rec(Resource::Riscos, 3, json!({"risco_fator": "Papel", "setor": "", "pontuacao": 9})),
                rec(Resource::Riscos, 4, json!({"risco_fator": "Sem nota", "setor": "RH"})),
            ],
            incidents: vec![
                rec(Resource::Incidentes, 1, json!({"data_registro": "2025-01-03"})),
                rec(Resource::Incidentes, 2, json!({"data_registro": "2024-12-30", "data_encerramento": "2025-01-02"})),
                rec(Resource::Incidentes, 3, json!({"data_registro": "2025-01-15"})),
            ],
            logins: vec![login(3, &bob), login(2, &alice), login(1, &alice)],
            users: vec![alice, bob],
        }
    }

    #[test]
    fn conformity_weights_checklist_plans_and_documents() {
        let d = Dashboard::build(&sample(), day("2025-02-01"), DEFAULT_RANKING_LIMIT);
        // 50% checklist, 25% plans concluded, 50% documents in date
        assert_eq!(d.kpis.conformidade, 42.5);
        assert_eq!(d.indice_maturidade.indice, 40.0);
        assert_eq!(d.indice_maturidade.percent_acoes, 25.0);
        assert_eq!(d.kpis.riscos_mapeados, 4);
        assert_eq!(d.kpis.acoes_atrasadas, 1);
        assert_eq!(d.kpis.docs_vencendo30d, 1);
        assert_eq!(d.kpis.alertas, 2);
    }

    #[test]
    fn empty_store_yields_zeroes() {
        let d = Dashboard::build(&DashboardInput::default(), day("2025-02-01"), DEFAULT_RANKING_LIMIT);
        assert_eq!(d.kpis.conformidade, 0.0);
        assert!(d.top_riscos.is_empty());
        assert_eq!(d.acoes_status.iter().map(|s| s.value).sum::<usize>(), 0);
    }

    #[test]
    fn risk_breakdowns() {
        let d = Dashboard::build(&sample(), day("2025-02-01"), DEFAULT_RANKING_LIMIT);
        let dist: Vec<usize> = d.riscos_distribuicao.iter().map(|b| b.value).collect();
        assert_eq!(dist, vec![1, 1, 0, 1]);

        assert_eq!(d.riscos_por_setor[0].setor, "TI");
        assert_eq!(d.riscos_por_setor[0].quantidade, 2);
        assert!(d.riscos_por_setor.iter().any(|s| s.setor == "Não informado"));

        let top: Vec<i64> = d.top_riscos.iter().map(|r| r.id).collect();
        assert_eq!(top, vec![1, 3, 2]);
        assert_eq!(d.top_riscos[0].owner, "Backup");
    }

    #[test]
    fn action_status_marks_late_plans() {
        let d = Dashboard::build(&sample(), day("2025-02-01"), DEFAULT_RANKING_LIMIT);
        assert_eq!(
            d.acoes_status,
            vec![
                NameValue { name: "Concluído".into(), value: 1 },
                NameValue { name: "Em andamento".into(), value: 1 },
                NameValue { name: "Não iniciado".into(), value: 1 },
                NameValue { name: "Atrasado".into(), value: 1 },
            ]
        );
        let months: Vec<&str> = d.acoes_timeline.iter().map(|m| m.mes.as_str()).collect();
        assert_eq!(months, vec!["2025-01", "2025-03"]);
        assert_eq!(d.acoes_timeline[0].atrasadas, 1);
    }

    #[test]
    fn incidents_and_logins() {
        let d = Dashboard::build(&sample(), day("2025-02-01"), 1);
        let months: Vec<(&str, usize)> = d.incidentes_timeline.iter().map(|m| (m.mes.as_str(), m.qtd)).collect();
        assert_eq!(months, vec![("2024-12", 1), ("2025-01", 2)]);

        assert_eq!(d.logins_recentes.len(), 3);
        assert_eq!(d.logins_recentes[0].usuario, "bob@example.com");
        assert_eq!(d.logins_recentes[1].funcao, "dpo");

        assert_eq!(d.ranking_usuarios.len(), 1);
        assert_eq!(d.ranking_usuarios[0].nome, "Alice");
        assert_eq!(d.ranking_usuarios[0].acessos, 2);
    }

    #[test]
    fn documents_due_are_sorted_within_window() {
        let d = Dashboard::build(&sample(), day("2025-02-01"), DEFAULT_RANKING_LIMIT);
        assert_eq!(d.documentos_vencimentos.len(), 1);
        assert_eq!(d.documentos_vencimentos[0].evidencia, "Política");
    }
}
