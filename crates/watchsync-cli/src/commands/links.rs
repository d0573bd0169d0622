use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde::Serialize;
use serde_json::json;
use watch_sync_config::PathManager;
use watch_sync_core::JsonLinkStore;
use watch_sync_models::{Link, SyncDirection};
use watch_sync_sources::LinkStore;

pub async fn run_links(output: &Output) -> Result<()> {
    let paths = PathManager::default();
    let account_store = JsonLinkStore::account_links(&paths);
    let history_store = JsonLinkStore::history_links(&paths);

    let account_links = account_store
        .get_all_links()
        .await
        .map_err(|e| eyre!("Failed to read account links: {}", e))?;
    let history_links = history_store
        .get_all_links()
        .await
        .map_err(|e| eyre!("Failed to read history links: {}", e))?;

    output.json(&json!({
        "type": "links",
        "account": account_links,
        "history": history_links,
    }));
    if !output.is_human() {
        return Ok(());
    }

    print_section(output, "Account links", account_store.path(), &account_links);
    print_section(output, "History links", history_store.path(), &history_links);
    Ok(())
}

fn print_section<D>(output: &Output, title: &str, path: &std::path::Path, links: &[Link<D>])
where
    D: SyncDirection + Serialize,
{
    if links.is_empty() {
        output.info(format!("{}: none ({})", title, path.display()));
        return;
    }
    output.info(format!("{} ({})", title, path.display()));
    output.table(&["Side A", "Side B", "Direction", "Ids", "Last synced"], link_rows(links));
}

fn link_rows<D>(links: &[Link<D>]) -> Vec<Vec<String>>
where
    D: SyncDirection + Serialize,
{
    links
        .iter()
        .map(|link| {
            vec![
                link.side_a_id.clone(),
                link.side_b_id.clone(),
                direction_label(&link.sync_config.direction),
                if link.sync_config.ids.is_empty() {
                    "-".to_string()
                } else {
                    link.sync_config.ids.len().to_string()
                },
                link.sync_state
                    .last_synced_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                    .unwrap_or_else(|| "never".to_string()),
            ]
        })
        .collect()
}

/// The direction as it is written in the link file
fn direction_label<D: Serialize>(direction: &D) -> String {
    match serde_json::to_value(direction) {
        Ok(serde_json::Value::String(s)) => s,
        _ => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use watch_sync_models::{AccountDirection, HistoryDirection, SyncConfig, SyncState};

    fn link<D>(direction: D, ids: &[&str], synced: bool) -> Link<D> {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        Link {
            side_a_id: "stremio-a".to_string(),
            side_b_id: "other".to_string(),
            sync_config: SyncConfig {
                direction,
                ids: ids.iter().map(|s| s.to_string()).collect(),
            },
            sync_state: SyncState {
                last_synced_at: synced.then_some(at),
            },
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_rows_describe_links() {
        let rows = link_rows(&[link(AccountDirection::AToB, &["tt1", "tt2"], true)]);
        assert_eq!(rows[0][2], "a_to_b");
        assert_eq!(rows[0][3], "2");
        assert_eq!(rows[0][4], "2024-05-01 08:30:00 UTC");

        let rows = link_rows(&[link(HistoryDirection::Both, &[], false)]);
        assert_eq!(rows[0][2], "both");
        assert_eq!(rows[0][3], "-");
        assert_eq!(rows[0][4], "never");
    }
}
