use anyhow::Result;

use stt_core::ipc::DaemonResponse;
use stt_core::{DaemonClient, RouteEntry};

/// Print each response; returns false if any failed
fn report(responses: &[DaemonResponse]) -> bool {
    let mut ok = true;
    for response in responses {
        if response.success {
            println!("{}", response.response);
            if !response.error.is_empty() {
                eprintln!("warning: {}", response.error);
            }
        } else {
            eprintln!("error: {}", response.error);
            ok = false;
        }
    }
    ok
}

pub async fn add(client: &DaemonClient, domains: Vec<String>) -> Result<bool> {
    Ok(report(&client.add(domains).await?))
}

pub async fn remove(client: &DaemonClient, domains: Vec<String>) -> Result<bool> {
    Ok(report(&client.remove(domains).await?))
}

pub async fn purge(client: &DaemonClient) -> Result<bool> {
    Ok(report(&[client.purge().await?]))
}

pub async fn list(client: &DaemonClient) -> Result<bool> {
    let response = client.list().await?;
    if !response.success {
        return Ok(report(&[response]));
    }

    let entries: Vec<RouteEntry> = serde_json::from_str(&response.response)?;
    if entries.is_empty() {
        println!("No routes yet.");
        println!("\nTo route a domain around the VPN, run:");
        println!("  stt add <domain>");
        return Ok(true);
    }

    println!("Routes ({}):\n", entries.len());

    for entry in &entries {
        let ips: Vec<String> = entry.resolved_ips.iter().map(ToString::to_string).collect();
        println!("  {} via {}", entry.domain, entry.gateway);
        println!("    IPs: {}", ips.join(", "));
    }

    Ok(true)
}
