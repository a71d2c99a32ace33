use fetchkit_http::{ActionDescriptor, ActionTable, FetchClient, ParamSpec, RestResource, ServiceClient, Value};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Serialize, Deserialize)]
struct Post {
    id: u32,
    title: String,
}

struct PostClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let client = FetchClient::from_env()?;

    let posts = RestResource::<Post>::new(client.clone(), "Post")?;
    println!("{:?}", posts.get(1).await?);

    let mut actions = ActionTable::new();
    actions.register(
        ActionDescriptor::get("comments")
            .route("{:resources}/{id}/comments")
            .param(ParamSpec::route("id"))
            .param(ParamSpec::query_as("page_size", "limit")),
    )?;
    let service = ServiceClient::for_type::<PostClient>(client, actions)?.lowercase_paths(true);

    let comments: Value = service
        .call("comments", None, &[json!(1), json!(20)])
        .await?;
    println!("{comments}");

    Ok(())
}
