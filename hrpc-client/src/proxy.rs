use crate::dispatcher::Invoker;
use hrpc_core::{RpcError, ServiceDescriptor};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Encodes one argument ahead of dispatch. An unencodable argument is a
/// `Serialization` failure before any network round trip.
pub fn encode_arg<T: Serialize>(arg: &T) -> Result<Value, RpcError> {
    serde_json::to_value(arg)
        .map_err(|e| RpcError::Serialization(format!("cannot encode argument: {}", e)))
}

/// Generic dispatch object for one service: checks a call against the
/// descriptor, forwards it to the invoker, decodes the result. Every
/// invocation is independent; nothing is cached across calls.
#[derive(Clone)]
pub struct ServiceProxy {
    descriptor: Arc<ServiceDescriptor>,
    invoker: Arc<dyn Invoker>,
    call_timeout: Duration,
}

impl ServiceProxy {
    pub fn new(
        descriptor: Arc<ServiceDescriptor>,
        invoker: Arc<dyn Invoker>,
        call_timeout: Duration,
    ) -> Self {
        ServiceProxy {
            descriptor,
            invoker,
            call_timeout,
        }
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    pub async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> Result<R, RpcError> {
        let declared = self.descriptor.method(method).ok_or_else(|| {
            RpcError::Configuration(format!(
                "method {} is not declared on {}",
                method,
                self.descriptor.service_id()
            ))
        })?;
        if declared.arity() != args.len() {
            return Err(RpcError::Serialization(format!(
                "method {} of {} takes {} arguments, got {}",
                method,
                self.descriptor.service_id(),
                declared.arity(),
                args.len()
            )));
        }

        let value = self
            .invoker
            .invoke(
                self.descriptor.service_id(),
                method,
                args,
                Some(self.call_timeout),
            )
            .await?;
        serde_json::from_value(value)
            .map_err(|e| RpcError::Serialization(format!("cannot decode {} result: {}", method, e)))
    }
}

impl std::fmt::Debug for ServiceProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProxy")
            .field("service", &self.descriptor.service_id())
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

/// Implemented by `remote_service!`-generated clients so the registry can
/// describe them and the bootstrap can construct them.
pub trait RemoteProxy: Clone + Send + Sync + Sized + 'static {
    fn descriptor() -> ServiceDescriptor;
    fn from_proxy(proxy: ServiceProxy) -> Self;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records invocations and answers from a canned script.
    pub struct MockInvoker {
        pub calls: Mutex<Vec<(String, String, Vec<Value>)>>,
        pub reply: Result<Value, fn() -> RpcError>,
    }

    impl MockInvoker {
        pub fn replying(value: Value) -> Arc<Self> {
            Arc::new(MockInvoker {
                calls: Mutex::new(Vec::new()),
                reply: Ok(value),
            })
        }

        pub fn failing(err: fn() -> RpcError) -> Arc<Self> {
            Arc::new(MockInvoker {
                calls: Mutex::new(Vec::new()),
                reply: Err(err),
            })
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Invoker for MockInvoker {
        async fn invoke(
            &self,
            service: &str,
            method: &str,
            args: Vec<Value>,
            _timeout: Option<Duration>,
        ) -> Result<Value, RpcError> {
            self.calls
                .lock()
                .unwrap()
                .push((service.to_string(), method.to_string(), args));
            match &self.reply {
                Ok(value) => Ok(value.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    pub fn hello_proxy(invoker: Arc<dyn Invoker>) -> ServiceProxy {
        let descriptor = ServiceDescriptor::builder("sample.spi.HelloService", "sample.spi")
            .method("greet", vec!["String".to_string()], "String")
            .build();
        ServiceProxy::new(Arc::new(descriptor), invoker, Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{hello_proxy, MockInvoker};
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_call_forwards_and_decodes() {
        let invoker = MockInvoker::replying(json!("echo:a"));
        let proxy = hello_proxy(invoker.clone());

        let result: String = proxy.call("greet", vec![json!("a")]).await.unwrap();
        assert_eq!(result, "echo:a");

        let calls = invoker.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "sample.spi.HelloService");
        assert_eq!(calls[0].1, "greet");
        assert_eq!(calls[0].2, vec![json!("a")]);
    }

    #[tokio::test]
    async fn test_undeclared_method_rejected_before_dispatch() {
        let invoker = MockInvoker::replying(json!(null));
        let proxy = hello_proxy(invoker.clone());

        let result: Result<String, _> = proxy.call("shout", vec![json!("a")]).await;
        assert!(matches!(result, Err(RpcError::Configuration(_))));
        assert_eq!(invoker.call_count(), 0);
    }

    #[tokio::test]
    async fn test_arity_mismatch_rejected_before_dispatch() {
        let invoker = MockInvoker::replying(json!(null));
        let proxy = hello_proxy(invoker.clone());

        let result: Result<String, _> = proxy.call("greet", vec![]).await;
        assert!(matches!(result, Err(RpcError::Serialization(_))));
        assert_eq!(invoker.call_count(), 0);
    }

    #[tokio::test]
    async fn test_result_shape_mismatch_is_serialization_error() {
        let invoker = MockInvoker::replying(json!("not a number"));
        let proxy = hello_proxy(invoker);

        let result: Result<i64, _> = proxy.call("greet", vec![json!("a")]).await;
        assert!(matches!(result, Err(RpcError::Serialization(_))));
    }

    #[test]
    fn test_encode_arg_fails_fast_on_unencodable_value() {
        assert!(encode_arg(&"fine").is_ok());
        assert!(matches!(
            encode_arg(&f64::NAN),
            Err(RpcError::Serialization(_))
        ));
    }
}
