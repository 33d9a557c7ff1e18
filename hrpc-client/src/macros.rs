//! Declaration macro for typed remote service clients

/// Declares a typed client for one remote service interface.
///
/// Expands to a struct holding a [`ServiceProxy`](crate::ServiceProxy),
/// one async method per remote method, and a
/// [`RemoteProxy`](crate::RemoteProxy) impl so the service registry can
/// describe the interface and the bootstrap can construct the client.
/// Each generated method encodes its arguments up front, forwards the
/// call to the dispatcher and decodes the result.
///
/// # Example
///
/// ```rust
/// use hrpc_client::remote_service;
///
/// remote_service! {
///     /// Client for the greeting service.
///     pub HelloServiceClient {
///         service = "sample.spi.HelloService",
///         package = "sample.spi",
///         fn greet(name: String) -> String;
///     }
/// }
/// ```
#[macro_export]
macro_rules! remote_service {
    (
        $(#[$meta:meta])*
        $vis:vis $name:ident {
            service = $service:literal,
            package = $package:literal,
            $( group = $group:literal, )?
            $( fn $method:ident ( $( $arg:ident : $argty:ty ),* $(,)? ) -> $ret:ty ; )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone)]
        $vis struct $name {
            proxy: $crate::ServiceProxy,
        }

        impl $name {
            $(
                pub async fn $method(&self, $( $arg: $argty ),*) -> Result<$ret, $crate::RpcError> {
                    let args = vec![ $( $crate::encode_arg(&$arg)? ),* ];
                    self.proxy.call(stringify!($method), args).await
                }
            )+
        }

        impl $crate::RemoteProxy for $name {
            fn descriptor() -> $crate::ServiceDescriptor {
                $crate::ServiceDescriptor::builder($service, $package)
                    $( .group($group) )?
                    $(
                        .method(
                            stringify!($method),
                            vec![ $( ::std::any::type_name::<$argty>().to_string() ),* ],
                            ::std::any::type_name::<$ret>(),
                        )
                    )+
                    .build()
            }

            fn from_proxy(proxy: $crate::ServiceProxy) -> Self {
                Self { proxy }
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("service", &$service)
                    .finish()
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::proxy::test_support::MockInvoker;
    use crate::proxy::{RemoteProxy, ServiceProxy};
    use crate::RpcError;
    use hrpc_core::ErrorDetail;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    remote_service! {
        /// Client used by the macro tests.
        pub TestServiceClient {
            service = "test.spi.TestService",
            package = "test.spi",
            fn echo(value: String) -> String;
            fn add(a: i64, b: i64) -> i64;
            fn ping() -> bool;
        }
    }

    remote_service! {
        pub GroupedServiceClient {
            service = "test.spi.GroupedService",
            package = "test.spi",
            group = "v2",
            fn touch() -> bool;
        }
    }

    fn attach<P: RemoteProxy>(invoker: Arc<MockInvoker>) -> P {
        let descriptor = Arc::new(P::descriptor());
        P::from_proxy(ServiceProxy::new(
            descriptor,
            invoker,
            Duration::from_secs(1),
        ))
    }

    #[test]
    fn test_generated_descriptor() {
        let descriptor = TestServiceClient::descriptor();
        assert_eq!(descriptor.service_id(), "test.spi.TestService");
        assert_eq!(descriptor.package(), "test.spi");
        assert_eq!(descriptor.group(), None);
        assert_eq!(descriptor.methods().len(), 3);

        let add = descriptor.method("add").unwrap();
        assert_eq!(add.arity(), 2);
        assert!(add.param_types()[0].contains("i64"));
        assert!(add.return_type().contains("i64"));

        let ping = descriptor.method("ping").unwrap();
        assert_eq!(ping.arity(), 0);
        assert!(ping.return_type().contains("bool"));

        assert!(descriptor.validate().is_ok());
    }

    #[test]
    fn test_group_tag_carried_into_descriptor() {
        let descriptor = GroupedServiceClient::descriptor();
        assert_eq!(descriptor.group(), Some("v2"));
    }

    #[tokio::test]
    async fn test_generated_method_delegates_to_invoker() {
        let invoker = MockInvoker::replying(json!("echo:a"));
        let client: TestServiceClient = attach(invoker.clone());

        assert_eq!(client.echo("a".to_string()).await.unwrap(), "echo:a");

        let calls = invoker.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "test.spi.TestService");
        assert_eq!(calls[0].1, "echo");
        assert_eq!(calls[0].2, vec![json!("a")]);
    }

    #[tokio::test]
    async fn test_generated_method_surfaces_remote_error() {
        let invoker =
            MockInvoker::failing(|| RpcError::Remote(ErrorDetail::application("boom")));
        let client: TestServiceClient = attach(invoker);

        match client.add(1, 2).await {
            Err(RpcError::Remote(detail)) => assert_eq!(detail.message, "boom"),
            other => panic!("expected Remote error, got {:?}", other),
        }
    }
}
