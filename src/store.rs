use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tracing::{debug, error, warn};

use crate::{portfolio::Portfolio, state::StateEvent, AppEvent};

/// Reads a portfolio snapshot. A missing file is not an error.
pub async fn load(path: &Path) -> Result<Option<Portfolio>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to read {}", path.display()))
        }
    };
    let portfolio = serde_json::de::from_str(&content)
        .with_context(|| format!("Invalid portfolio snapshot in {}", path.display()))?;
    Ok(Some(portfolio))
}

pub async fn save(path: &Path, portfolio: &Portfolio) -> Result<()> {
    let json = serde_json::ser::to_string_pretty(portfolio)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, json)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// Saves every portfolio update received on `rx`, in order. Write failures
/// are logged and the writer keeps going.
pub async fn run_writer(path: PathBuf, mut rx: Receiver<AppEvent>) {
    loop {
        match rx.recv().await {
            Ok(AppEvent::State(StateEvent::Portfolio(portfolio))) => {
                match save(&path, &portfolio).await {
                    Ok(()) => debug!("Portfolio saved to {}", path.display()),
                    Err(err) => error!("Failed to save portfolio : {:#}", err),
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!("Portfolio writer lagged, {} events skipped", skipped);
            }
            Err(RecvError::Closed) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::{Trade, TradeAction};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("portfolio-{}.json", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let path = temp_path();
        let portfolio = Portfolio::new(dec!(10000))
            .apply(&Trade {
                coin_id: String::from("btc"),
                action: TradeAction::Buy,
                amount: dec!(0.5),
                price: dec!(1000),
            })
            .unwrap();

        save(&path, &portfolio).await.unwrap();
        let loaded = load(&path).await.unwrap();
        assert_eq!(loaded, Some(portfolio));

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        assert_eq!(load(&temp_path()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_load_corrupted_snapshot() {
        let path = temp_path();
        tokio::fs::write(&path, r#"{"cash": "-5", "holdings": {}}"#)
            .await
            .unwrap();
        assert!(load(&path).await.is_err());

        tokio::fs::write(&path, "not json").await.unwrap();
        assert!(load(&path).await.is_err());

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_writer_saves_broadcast_portfolio() {
        let path = temp_path();
        let (tx_app, _) = tokio::sync::broadcast::channel::<AppEvent>(16);
        let writer = tokio::task::spawn(run_writer(path.clone(), tx_app.subscribe()));

        // sent before the writer task gets to run
        let portfolio = Portfolio::new(dec!(42));
        tx_app
            .send(AppEvent::State(StateEvent::Portfolio(portfolio.clone())))
            .unwrap();

        let mut loaded = None;
        for _ in 0..100 {
            if let Ok(Some(p)) = load(&path).await {
                loaded = Some(p);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(loaded, Some(portfolio));

        writer.abort();
        let _ = tokio::fs::remove_file(&path).await;
    }
}
