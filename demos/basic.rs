use std::time::Duration;

use fetchkit_http::{Body, FetchClient, Value};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut client = FetchClient::from_env()?;
    client
        .options_mut()
        .set_retry_count(2)
        .set_retry_delay(Duration::from_millis(250))
        .on_api_error(|error| eprintln!("api error: {:?}", error.title));

    let created = client
        .post::<Value>("todos", Body::json(&json!({"title": "write docs"}))?)
        .await?;
    println!("created ({}): {:?}", created.status(), created.content());

    let todos = client.get::<Value>("todos").await?;
    println!(
        "{} after {} attempt(s) in {:?}",
        todos.status(),
        todos.attempts(),
        todos.duration()
    );

    Ok(())
}
