use serde_json::{json, Value};

use crate::cli::OutputFormat;

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Output a success message in the appropriate format
pub fn output_success(output_format: &OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let (Some(Value::Object(extra)), Some(target)) = (data, response.as_object_mut()) {
                target.extend(extra);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output an error message in the appropriate format
pub fn output_error(output_format: &OutputFormat, message: &str, error_code: Option<&str>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": false,
                "error": message
            });

            if let Some(code) = error_code {
                response["error_code"] = json!(code);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            eprintln!("Error: {}", message);
        }
    }
    Ok(())
}

/// Output an empty collection in the appropriate format
pub fn output_empty_collection(output_format: &OutputFormat, collection_name: &str, message: &str) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({ collection_name: [] }))?);
        }
        OutputFormat::Text => {
            println!("{}", message);
        }
    }
    Ok(())
}

/// Pretty JSON in both modes; API payloads have no better text form
pub fn output_value(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Output current item information in the appropriate format
pub fn output_current_item(output_format: &OutputFormat, item_type: &str, name: &str, details: Value) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ format!("current_{}", item_type): details }))?
            );
        }
        OutputFormat::Text => {
            println!("Current {}: {}", item_type, name);
            for key in ["url", "auth_mode", "description"] {
                if let Some(value) = details.get(key).and_then(Value::as_str).filter(|v| !v.is_empty()) {
                    println!("{}: {}", capitalize(&key.replace('_', " ")), value);
                }
            }
        }
    }
    Ok(())
}

/// Output "no current item" message in the appropriate format
pub fn output_no_current_item(output_format: &OutputFormat, item_type: &str) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ format!("current_{}", item_type): null }))?
            );
        }
        OutputFormat::Text => {
            println!("No current {} set", item_type);
        }
    }
    Ok(())
}

/// Generic function to handle switching the current item
pub fn switch_current_item<F, G>(
    item_name: &str,
    item_type: &str,
    check_exists: F,
    update_current: G,
    output_format: &OutputFormat,
) -> anyhow::Result<()>
where
    F: Fn(&str) -> anyhow::Result<bool>,
    G: Fn(&str) -> anyhow::Result<()>,
{
    if !check_exists(item_name)? {
        return Err(anyhow::anyhow!("{} '{}' not found", capitalize(item_type), item_name));
    }

    update_current(item_name)?;

    output_success(
        output_format,
        &format!("Switched to {} '{}'", item_type, item_name),
        Some(json!({ format!("current_{}", item_type): item_name })),
    )
}

/// Generic function to handle deleting items and clearing current if needed
pub fn delete_item_with_current_check<F, G, H>(
    item_name: &str,
    item_type: &str,
    check_exists: F,
    remove_item: G,
    clear_if_current: H,
    output_format: &OutputFormat,
) -> anyhow::Result<()>
where
    F: Fn(&str) -> anyhow::Result<bool>,
    G: Fn(&str) -> anyhow::Result<()>,
    H: Fn(&str) -> anyhow::Result<()>,
{
    if !check_exists(item_name)? {
        return Err(anyhow::anyhow!("{} '{}' not found", capitalize(item_type), item_name));
    }

    remove_item(item_name)?;
    clear_if_current(item_name)?;

    output_success(
        output_format,
        &format!("{} '{}' deleted successfully", capitalize(item_type), item_name),
        None,
    )
}

/// Read one trimmed line from stdin after printing a prompt
pub fn prompt_line(prompt: &str) -> anyhow::Result<String> {
    use std::io::Write;

    print!("{}", prompt);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Parse a JSON object from an argument or, when absent, from stdin
pub fn read_json_body(inline: Option<String>) -> anyhow::Result<Value> {
    let raw = match inline {
        Some(raw) => raw,
        None => {
            let mut buf = String::new();
            std::io::Read::read_to_string(&mut std::io::stdin(), &mut buf)?;
            buf
        }
    };
    let value: Value = serde_json::from_str(raw.trim()).map_err(|e| anyhow::anyhow!("Invalid JSON body: {}", e))?;
    if !value.is_object() {
        anyhow::bail!("Expected a JSON object");
    }
    Ok(value)
}
