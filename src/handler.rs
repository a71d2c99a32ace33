use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::response::ResponseMeta;
use crate::serializer::deserialize_as;
use crate::{Response, Serializer, SerializerFlags};

/// A completed response as seen by the handler chain.
pub(crate) struct HandlerInput<'a> {
    /// The `Response<T>` of the call, for direct hand-off to matching handlers.
    pub(crate) typed: &'a dyn Any,
    pub(crate) meta: &'a ResponseMeta,
}

pub(crate) trait ResponseHandler: Send + Sync {
    /// Returns `false` when the handler could not interpret the response.
    fn try_handle(
        &self,
        input: &HandlerInput<'_>,
        serializer: &dyn Serializer,
        flags: &SerializerFlags,
    ) -> bool;
}

pub(crate) enum Callback<H> {
    Response(Box<dyn Fn(&Response<H>) + Send + Sync>),
    Content(Box<dyn Fn(&H) + Send + Sync>),
}

/// Handler registered for response type `H`.
///
/// When the call was made for `H` the decoded content is passed through as is,
/// otherwise the raw text is decoded again into `H`.
pub(crate) struct TypedHandler<H> {
    callback: Callback<H>,
}

impl<H> TypedHandler<H> {
    pub(crate) fn new(callback: Callback<H>) -> Self {
        Self { callback }
    }

    fn invoke(&self, response: &Response<H>) -> bool {
        match &self.callback {
            Callback::Response(callback) => callback(response),
            Callback::Content(callback) => match response.content() {
                Some(content) => callback(content),
                None => return false,
            },
        }
        true
    }
}

impl<H> ResponseHandler for TypedHandler<H>
where
    H: DeserializeOwned + 'static,
{
    fn try_handle(
        &self,
        input: &HandlerInput<'_>,
        serializer: &dyn Serializer,
        flags: &SerializerFlags,
    ) -> bool {
        if let Some(response) = input.typed.downcast_ref::<Response<H>>() {
            return self.invoke(response);
        }

        let Some(raw) = input.meta.raw_content.as_deref() else {
            return false;
        };
        match deserialize_as::<H>(serializer, raw, flags) {
            Ok(content) => {
                let response = Response::from_parts(input.meta.clone(), Some(content), None);
                self.invoke(&response)
            }
            Err(_) => false,
        }
    }
}

/// Runs every handler in order and returns how many handled the response.
///
/// A panicking handler counts as "not handled"; the chain keeps going.
pub(crate) fn run_chain(
    handlers: &[Arc<dyn ResponseHandler>],
    input: &HandlerInput<'_>,
    serializer: &dyn Serializer,
    flags: &SerializerFlags,
) -> usize {
    handlers
        .iter()
        .filter(|handler| {
            match catch_unwind(AssertUnwindSafe(|| handler.try_handle(input, serializer, flags))) {
                Ok(handled) => handled,
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(status = input.meta.status, "response handler panicked");
                    false
                }
            }
        })
        .count()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use serde::Deserialize;

    use super::{run_chain, Callback, HandlerInput, ResponseHandler, TypedHandler};
    use crate::response::tests::meta;
    use crate::{ApiErrorResponse, JsonSerializer, Response, SerializerFlags};

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: u32,
    }

    fn input_for<T: 'static>(response: &Response<T>) -> HandlerInput<'_> {
        HandlerInput {
            typed: response,
            meta: response.meta(),
        }
    }

    #[test]
    fn typed_handler_receives_decoded_content_directly() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let handler = TypedHandler::<User>::new(Callback::Content(Box::new(move |user: &User| {
            *sink.lock().expect("lock") = Some(user.id);
        })));
        // raw text disagrees with content: proves no re-decode happened
        let response = Response::from_parts(meta(200, Some("garbage")), Some(User { id: 9 }), None);

        assert!(handler.try_handle(&input_for(&response), &JsonSerializer, &SerializerFlags::new()));
        assert_eq!(*seen.lock().expect("lock"), Some(9));
    }

    #[test]
    fn generic_handler_redecodes_raw_text() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let handler = TypedHandler::<ApiErrorResponse>::new(Callback::Response(Box::new(
            move |response: &Response<ApiErrorResponse>| {
                *sink.lock().expect("lock") =
                    response.content().and_then(|problem| problem.title.clone());
            },
        )));
        let response: Response<User> = Response::from_parts(
            meta(400, Some(r#"{"title":"bad input","status":400}"#)),
            None,
            None,
        );

        assert!(handler.try_handle(&input_for(&response), &JsonSerializer, &SerializerFlags::new()));
        assert_eq!(seen.lock().expect("lock").as_deref(), Some("bad input"));
    }

    #[test]
    fn undecodable_payload_is_not_handled() {
        let handler = TypedHandler::<User>::new(Callback::Content(Box::new(|_: &User| {})));
        let response: Response<String> =
            Response::from_parts(meta(500, Some("<html>oops</html>")), None, None);

        assert!(!handler.try_handle(&input_for(&response), &JsonSerializer, &SerializerFlags::new()));
    }

    #[test]
    fn chain_survives_panicking_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handlers: Vec<Arc<dyn ResponseHandler>> = vec![
            Arc::new(TypedHandler::<User>::new(Callback::Content(Box::new(|_: &User| {
                panic!("handler failure")
            })))),
            Arc::new(TypedHandler::<User>::new(Callback::Content(Box::new(move |_: &User| {
                counter.fetch_add(1, Ordering::SeqCst);
            })))),
        ];
        let response = Response::from_parts(meta(200, Some(r#"{"id":1}"#)), Some(User { id: 1 }), None);

        let handled = run_chain(
            &handlers,
            &input_for(&response),
            &JsonSerializer,
            &SerializerFlags::new(),
        );
        assert_eq!(handled, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
