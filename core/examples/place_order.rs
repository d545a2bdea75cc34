// core/examples/place_order.rs

use serde_json::json;
use std::path::PathBuf;
use trancode::{EngineConfig, EngineError, ExecutionRequest, TranCodeEngine, VarMap};
use tracing::info;

fn request_inputs(sku: &str, qty: i64) -> VarMap {
  VarMap::from([("sku".to_string(), json!(sku)), ("qty".to_string(), json!(qty))])
}

#[tokio::main]
async fn main() -> Result<(), EngineError> {
  // Initialize tracing (optional, for demonstration)
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- PlaceOrder Example ---");

  // 1. Point the file loader at the bundled definitions.
  let config = EngineConfig {
    trancode_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("trancodes"),
    cache_definitions: true,
    ..Default::default()
  };
  let engine = TranCodeEngine::builder().config(config).build()?;

  // 2. Host callbacks the definitions refer to by key.
  engine.callbacks().register_fn("pricing", |code, inputs, _cancel, _tx| async move {
    let qty = inputs.get("qty").and_then(|v| v.as_i64()).unwrap_or(0);
    info!(trancode = %code, qty, "Pricing order.");
    Ok::<_, anyhow::Error>(VarMap::from([("total".to_string(), json!(qty as f64 * 9.99))]))
  })?;
  engine.callbacks().register_fn("inventory", |_code, inputs, _cancel, tx| async move {
    let qty = inputs.get("qty").and_then(|v| v.as_i64()).unwrap_or(0);
    if qty > 5 {
      anyhow::bail!("only 5 units in stock");
    }
    info!(qty, joint_tx = tx.is_some(), "Stock reserved.");
    Ok(VarMap::from([("reserved".to_string(), json!(qty))]))
  })?;

  // 3. Run a few orders.
  for (sku, qty) in [("BOOK-1", 2), ("BOOK-1", 0), ("BOOK-1", 9)] {
    let outputs = engine
      .execute(ExecutionRequest::new("PlaceOrder").with_inputs(request_inputs(sku, qty)))
      .await?;
    info!(sku, qty, outputs = %json!(outputs), "Order processed.");
  }

  // 4. Unknown codes are reported, not panicked on.
  match engine.execute(ExecutionRequest::new("CancelOrder")).await {
    Err(e) => info!(error = %e, client_error = e.is_client_error(), "Expected failure."),
    Ok(outputs) => info!(?outputs, "Unexpected success."),
  }

  info!("--- PlaceOrder Example Complete ---");
  Ok(())
}
