use clap::Subcommand;
use serde_json::{json, Value};

use crate::cli::config::*;
use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::resources::Resource;

#[derive(Subcommand)]
pub enum DataCommands {
    #[command(about = "List records of a resource")]
    List {
        #[arg(help = "Resource, e.g. riscos or planos-acao")]
        resource: String,
        #[arg(long, help = "Case-insensitive text search")]
        search: Option<String>,
        #[arg(long, help = "Ordering field, prefix with - for descending")]
        ordering: Option<String>,
        #[arg(long, help = "Page number (enables the paginated envelope)")]
        page: Option<usize>,
        #[arg(long, help = "Page size")]
        page_size: Option<usize>,
    },

    #[command(about = "Show one record")]
    Get {
        resource: String,
        id: i64,
    },

    #[command(about = "Create a record from a JSON object (argument or stdin)")]
    Create {
        resource: String,
        #[arg(long, short = 'd', help = "JSON body; read from stdin when omitted")]
        data: Option<String>,
    },

    #[command(about = "Update a record (PATCH, or PUT with --replace)")]
    Update {
        resource: String,
        id: i64,
        #[arg(long, short = 'd', help = "JSON body; read from stdin when omitted")]
        data: Option<String>,
        #[arg(long, help = "Send every field (PUT) instead of a partial update")]
        replace: bool,
    },

    #[command(about = "Delete a record")]
    Delete {
        resource: String,
        id: i64,
    },

    #[command(about = "Show overdue action plans")]
    Overdue {
        #[arg(long, help = "Mark overdue plans as atrasado first (admin/dpo)")]
        mark: bool,
        #[arg(long, help = "With --mark, run even if already done today")]
        force: bool,
    },
}

fn resource(raw: &str) -> anyhow::Result<Resource> {
    Resource::from_path(raw).ok_or_else(|| {
        let known: Vec<&str> = Resource::ALL.iter().map(|r| r.path()).collect();
        anyhow::anyhow!("Unknown resource '{}'. Known resources: {}", raw, known.join(", "))
    })
}

fn list_path(
    resource: Resource,
    search: Option<&str>,
    ordering: Option<&str>,
    page: Option<usize>,
    page_size: Option<usize>,
) -> String {
    let mut params = url::form_urlencoded::Serializer::new(String::new());
    if let Some(search) = search {
        params.append_pair("search", search);
    }
    if let Some(ordering) = ordering {
        params.append_pair("ordering", ordering);
    }
    if let Some(page) = page {
        params.append_pair("page", &page.to_string());
    }
    if let Some(size) = page_size {
        params.append_pair("page_size", &size.to_string());
    }
    let query = params.finish();
    if query.is_empty() {
        format!("{}/", resource.path())
    } else {
        format!("{}/?{}", resource.path(), query)
    }
}

fn print_records(output_format: &OutputFormat, resource: Resource, body: &Value) -> anyhow::Result<()> {
    let records = body
        .get("results")
        .and_then(Value::as_array)
        .or_else(|| body.as_array());

    match (output_format, records) {
        (OutputFormat::Text, Some(records)) if records.is_empty() => {
            println!("No {} found", resource);
            Ok(())
        }
        (OutputFormat::Text, Some(records)) => {
            let label = resource.search_fields().first().copied().unwrap_or("id");
            for record in records {
                let id = record.get("id").cloned().unwrap_or(Value::Null);
                let text = record.get(label).and_then(Value::as_str).unwrap_or("");
                println!("{:>6}  {}", id, text);
            }
            if let Some(count) = body.get("count") {
                println!("({} total)", count);
            }
            Ok(())
        }
        _ => output_value(body),
    }
}

pub async fn handle(cmd: DataCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let client = open_client().await?;

    match cmd {
        DataCommands::List { resource: raw, search, ordering, page, page_size } => {
            let resource = resource(&raw)?;
            let path = list_path(resource, search.as_deref(), ordering.as_deref(), page, page_size);
            let body = client.get(&path).await?;
            print_records(&output_format, resource, &body)
        }
        DataCommands::Get { resource: raw, id } => {
            let resource = resource(&raw)?;
            output_value(&client.get(&format!("{}/{}/", resource.path(), id)).await?)
        }
        DataCommands::Create { resource: raw, data } => {
            let resource = resource(&raw)?;
            let body = read_json_body(data)?;
            let created = client.post(&format!("{}/", resource.path()), &body).await?;
            let id = created.get("id").cloned().unwrap_or(Value::Null);
            output_success(
                &output_format,
                &format!("Created {} {}", resource, id),
                Some(json!({ "record": created })),
            )
        }
        DataCommands::Update { resource: raw, id, data, replace } => {
            let resource = resource(&raw)?;
            let body = read_json_body(data)?;
            let path = format!("{}/{}/", resource.path(), id);
            let updated = if replace {
                client.put(&path, &body).await?
            } else {
                client.patch(&path, &body).await?
            };
            output_success(
                &output_format,
                &format!("Updated {} {}", resource, id),
                Some(json!({ "record": updated })),
            )
        }
        DataCommands::Delete { resource: raw, id } => {
            let resource = resource(&raw)?;
            client.delete(&format!("{}/{}/", resource.path(), id)).await?;
            output_success(&output_format, &format!("Deleted {} {}", resource, id), None)
        }
        DataCommands::Overdue { mark, force } => {
            if mark {
                let path = if force {
                    "planos-acao/ensure-overdue/?force=1"
                } else {
                    "planos-acao/ensure-overdue/"
                };
                let result = client.post(path, &json!({})).await?;
                if let OutputFormat::Text = output_format {
                    if let Some(detail) = result.get("detail").and_then(Value::as_str) {
                        println!("{}", detail);
                    }
                }
            }

            let report = client.get("planos-acao/stats/overdue/").await?;
            match output_format {
                OutputFormat::Json => output_value(&report),
                OutputFormat::Text => {
                    let items = report.get("items").and_then(Value::as_array).cloned().unwrap_or_default();
                    if items.is_empty() {
                        println!("No overdue action plans");
                    }
                    for item in items {
                        println!(
                            "{:>6}  prazo {}  {} dia(s) de atraso  {}",
                            item.get("id").cloned().unwrap_or(Value::Null),
                            item.get("prazo").and_then(Value::as_str).unwrap_or("-"),
                            item.get("dias_atraso").cloned().unwrap_or(Value::Null),
                            item.get("risco_risco_fator").and_then(Value::as_str).unwrap_or(""),
                        );
                    }
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_paths_encode_the_query() {
        assert_eq!(list_path(Resource::Riscos, None, None, None, None), "riscos/");
        assert_eq!(
            list_path(Resource::PlanosAcao, Some("treinar equipe"), Some("-prazo"), Some(2), None),
            "planos-acao/?search=treinar+equipe&ordering=-prazo&page=2"
        );
    }

    #[test]
    fn unknown_resources_are_rejected() {
        assert!(resource("riscos").is_ok());
        assert!(resource("users").is_err());
    }
}
