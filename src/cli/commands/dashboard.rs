use serde_json::Value;

use crate::cli::config::open_client;
use crate::cli::utils::output_value;
use crate::cli::OutputFormat;

pub async fn handle(limit: Option<usize>, output_format: OutputFormat) -> anyhow::Result<()> {
    let client = open_client().await?;
    let path = match limit {
        Some(limit) => format!("dashboard/?limit={}", limit),
        None => "dashboard/".to_string(),
    };
    let dashboard = client.get(&path).await?;

    match output_format {
        OutputFormat::Json => output_value(&dashboard),
        OutputFormat::Text => {
            let kpis = &dashboard["kpis"];
            println!("Conformidade:          {}%", kpis["conformidade"]);
            println!("Riscos mapeados:       {}", kpis["riscosMapeados"]);
            println!("Ações atrasadas:       {}", kpis["acoesAtrasadas"]);
            println!("Docs vencendo em 30d:  {}", kpis["docsVencendo30d"]);
            println!("Alertas:               {}", kpis["alertas"]);
            println!("Índice de maturidade:  {}", dashboard["indiceMaturidade"]["indice"]);

            if let Some(top) = dashboard["topRiscos"].as_array().filter(|t| !t.is_empty()) {
                println!();
                println!("Top riscos:");
                for risk in top {
                    println!(
                        "  [{:>2}] {} ({})",
                        risk["score"],
                        risk["titulo"].as_str().unwrap_or(""),
                        risk["setor"].as_str().unwrap_or("-")
                    );
                }
            }

            if let Some(ranking) = dashboard["rankingUsuarios"].as_array().filter(|r| !r.is_empty()) {
                println!();
                println!("Acessos por usuário:");
                for entry in ranking {
                    println!(
                        "  {:<30} {}",
                        entry["nome"].as_str().unwrap_or(""),
                        entry.get("acessos").cloned().unwrap_or(Value::Null)
                    );
                }
            }
            Ok(())
        }
    }
}
