use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;

use crate::query::combine_url;
use crate::route::{self, ParamRole, ParamSpec};
use crate::{Body, FetchClient, FetchError, Method, Response, Result, SerializerFlags, Value};

/// Declaration of one endpoint of a service client.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionDescriptor {
    name: String,
    method: Method,
    route: Option<String>,
    action_name: Option<String>,
    params: Vec<ParamSpec>,
    flags: SerializerFlags,
}

impl ActionDescriptor {
    pub fn new(name: impl Into<String>, method: Method) -> Self {
        Self {
            name: name.into(),
            method,
            route: None,
            action_name: None,
            params: Vec::new(),
            flags: SerializerFlags::new(),
        }
    }

    pub fn get(name: impl Into<String>) -> Self {
        Self::new(name, Method::Get)
    }

    pub fn post(name: impl Into<String>) -> Self {
        Self::new(name, Method::Post)
    }

    pub fn put(name: impl Into<String>) -> Self {
        Self::new(name, Method::Put)
    }

    pub fn patch(name: impl Into<String>) -> Self {
        Self::new(name, Method::Patch)
    }

    pub fn delete(name: impl Into<String>) -> Self {
        Self::new(name, Method::Delete)
    }

    /// Route template, e.g. `{:resource}/{id}/avatar`.
    pub fn route(mut self, template: impl Into<String>) -> Self {
        self.route = Some(template.into());
        self
    }

    /// Path segment used by the default `{resource}/{action}` route instead of the name.
    pub fn action_name(mut self, action_name: impl Into<String>) -> Self {
        self.action_name = Some(action_name.into());
        self
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// Serializer flag merged into the options of every call of this action.
    pub fn flag(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.flags.insert(name.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    fn expects_body(&self) -> bool {
        self.params.iter().any(|param| param.role == ParamRole::Body)
    }

    fn template(&self, resource: &str) -> String {
        match &self.route {
            Some(route) => route.clone(),
            None => combine_url([resource, self.action_name.as_deref().unwrap_or(&self.name)]),
        }
    }
}

/// Actions of a service client, by name.
#[derive(Clone, Debug, Default)]
pub struct ActionTable {
    actions: BTreeMap<String, ActionDescriptor>,
}

impl ActionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, action: ActionDescriptor) -> Result<&mut Self> {
        if self.actions.contains_key(action.name()) {
            return Err(FetchError::Configuration(format!(
                "action `{}` is declared twice",
                action.name()
            )));
        }
        self.actions.insert(action.name.clone(), action);
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&ActionDescriptor> {
        self.actions.get(name)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Client for a resource-oriented API described by an [`ActionTable`].
#[derive(Clone, Debug)]
pub struct ServiceClient {
    client: FetchClient,
    resource: String,
    actions: Arc<ActionTable>,
    lowercase_paths: bool,
}

impl ServiceClient {
    pub fn new(client: FetchClient, resource: impl Into<String>, actions: ActionTable) -> Self {
        Self {
            client,
            resource: resource.into(),
            actions: Arc::new(actions),
            lowercase_paths: false,
        }
    }

    /// Derives the resource name from `S`'s type name, which must end with `Client`.
    pub fn for_type<S: ?Sized>(client: FetchClient, actions: ActionTable) -> Result<Self> {
        let resource = route::resource_name_from_type_name(std::any::type_name::<S>())?;
        Ok(Self::new(client, resource, actions))
    }

    /// Lowercases the literal parts of resolved routes; substituted values keep their case.
    pub fn lowercase_paths(mut self, lowercase: bool) -> Self {
        self.lowercase_paths = lowercase;
        self
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn client(&self) -> &FetchClient {
        &self.client
    }

    pub fn actions(&self) -> &ActionTable {
        &self.actions
    }

    /// Sends the named action. `args` hold one value per non-body parameter, in order.
    pub async fn send_action<T>(
        &self,
        action: &str,
        body: Option<Body>,
        args: &[Value],
    ) -> Result<Response<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let descriptor = self.actions.get(action).ok_or_else(|| {
            FetchError::Configuration(format!(
                "unknown action `{action}` on {} service",
                self.resource
            ))
        })?;
        if descriptor.expects_body() && body.is_none() {
            return Err(FetchError::Configuration(format!(
                "action `{action}` expects a request body"
            )));
        }

        let mut template = descriptor.template(&self.resource);
        if self.lowercase_paths {
            template = lowercase_literals(&route::substitute_resource_tokens(
                &template,
                &self.resource,
            )?);
        }
        let resolved = route::resolve(&template, &self.resource, descriptor.params(), args)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            action,
            method = %descriptor.method(),
            path = %resolved.path,
            "resolved service action"
        );

        let flags = descriptor.flags.clone();
        let route_parameters = resolved.route_parameters;
        let query_parameters = resolved.query_parameters;
        self.client
            .request_with(descriptor.method(), &resolved.path, body, move |options| {
                for value in &route_parameters {
                    options.add_route_parameter(value);
                }
                for (name, value) in &query_parameters {
                    options.add_query_parameter(name.clone(), value.clone());
                }
                for (name, value) in &flags {
                    options.set_flag(name.clone(), value.clone());
                }
            })
            .await
    }

    /// Like [`ServiceClient::send_action`], returning only the decoded content.
    ///
    /// A non-2xx response becomes [`FetchError::Status`].
    pub async fn call<T>(&self, action: &str, body: Option<Body>, args: &[Value]) -> Result<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let response = self.send_action::<T>(action, body, args).await?;
        if !response.is_success() {
            return Err(FetchError::Status {
                status: response.status(),
                body: response.raw_content().unwrap_or_default().to_owned(),
            });
        }
        response.into_content().ok_or_else(|| {
            FetchError::Decode(format!("action `{action}` returned no content"))
        })
    }
}

fn lowercase_literals(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut in_placeholder = false;
    for ch in template.chars() {
        match ch {
            '{' => in_placeholder = true,
            '}' => in_placeholder = false,
            _ => {}
        }
        if in_placeholder {
            out.push(ch);
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out
}

/// Generic CRUD client over `{:resource}/{id}` and `{:resources}`.
#[derive(Clone, Debug)]
pub struct RestResource<T> {
    service: ServiceClient,
    _resource: PhantomData<fn() -> T>,
}

impl<T> RestResource<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    pub fn new(client: FetchClient, resource: impl Into<String>) -> Result<Self> {
        let mut actions = ActionTable::new();
        actions
            .register(
                ActionDescriptor::get("get")
                    .route("{:resource}/{id}")
                    .param(ParamSpec::route("id")),
            )?
            .register(
                ActionDescriptor::post("create")
                    .route("{:resource}")
                    .param(ParamSpec::body("resource")),
            )?
            .register(
                ActionDescriptor::put("update")
                    .route("{:resource}/{id}")
                    .param(ParamSpec::route("id"))
                    .param(ParamSpec::body("resource")),
            )?
            .register(
                ActionDescriptor::delete("delete")
                    .route("{:resource}/{id}")
                    .param(ParamSpec::route("id")),
            )?
            .register(ActionDescriptor::get("get_all").route("{:resources}"))?;

        Ok(Self {
            service: ServiceClient::new(client, resource, actions),
            _resource: PhantomData,
        })
    }

    pub fn service(&self) -> &ServiceClient {
        &self.service
    }

    pub async fn get(&self, id: impl Into<Value>) -> Result<T> {
        self.service.call("get", None, &[id.into()]).await
    }

    pub async fn create(&self, resource: &T) -> Result<T> {
        self.service.call("create", Some(Body::json(resource)?), &[]).await
    }

    pub async fn update(&self, id: impl Into<Value>, resource: &T) -> Result<T> {
        self.service
            .call("update", Some(Body::json(resource)?), &[id.into()])
            .await
    }

    pub async fn delete(&self, id: impl Into<Value>) -> Result<()> {
        self.service
            .call::<IgnoredAny>("delete", None, &[id.into()])
            .await
            .map(|_| ())
    }

    pub async fn get_all(&self) -> Result<Vec<T>> {
        self.service.call("get_all", None, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{lowercase_literals, ActionDescriptor, ActionTable, ServiceClient};
    use crate::route::ParamSpec;
    use crate::{FetchClient, FetchError};

    struct UserClient;

    #[test]
    fn default_route_uses_resource_and_action_name() {
        let plain = ActionDescriptor::get("Profile");
        let renamed = ActionDescriptor::get("profile").action_name("Me");
        let routed = ActionDescriptor::get("x").route("custom/{id}");

        assert_eq!(plain.template("User"), "User/Profile");
        assert_eq!(renamed.template("User"), "User/Me");
        assert_eq!(routed.template("User"), "custom/{id}");
    }

    #[test]
    fn duplicate_actions_are_rejected() {
        let mut table = ActionTable::new();
        table.register(ActionDescriptor::get("list")).expect("first must register");
        let err = table
            .register(ActionDescriptor::post("list"))
            .expect_err("duplicate must fail");
        assert!(matches!(err, FetchError::Configuration(_)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn resource_name_comes_from_type() {
        let service = ServiceClient::for_type::<UserClient>(FetchClient::new(), ActionTable::new())
            .expect("must derive");
        assert_eq!(service.resource(), "User");
    }

    #[test]
    fn lowercasing_keeps_placeholders() {
        assert_eq!(lowercase_literals("Users/{userId}/Posts"), "users/{userId}/posts");
    }

    #[tokio::test]
    async fn missing_body_and_bad_arity_fail_before_io() {
        let mut table = ActionTable::new();
        table
            .register(ActionDescriptor::post("create").param(ParamSpec::body("user")))
            .expect("must register")
            .register(ActionDescriptor::get("find").param(ParamSpec::query("name")))
            .expect("must register");
        let service = ServiceClient::new(
            FetchClient::with_base_url("http://127.0.0.1:9"),
            "User",
            table,
        );

        let err = service
            .send_action::<serde_json::Value>("create", None, &[])
            .await
            .expect_err("body is required");
        assert!(matches!(err, FetchError::Configuration(_)));

        let err = service
            .send_action::<serde_json::Value>("find", None, &[json!("a"), json!("b")])
            .await
            .expect_err("arity must match");
        assert!(matches!(err, FetchError::Configuration(_)));

        let err = service
            .send_action::<serde_json::Value>("missing", None, &[])
            .await
            .expect_err("unknown action");
        assert!(matches!(err, FetchError::Configuration(_)));
    }
}
