//! The `protect` execution wrapper.
//!
//! [`TokenVaultAuthorizer`] binds a client identity, a policy and a
//! credential store. [`TokenVaultAuthorizer::protect`] wraps a tool callable
//! so that every call runs with a valid third-party credential in context,
//! or returns an [`Interrupt`] describing the consent the user must give.

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use toolvault_sdk::ExchangeClient;

use crate::cache::CredentialCache;
use crate::config::{AuthorizerConfig, ClientIdentity};
use crate::context::{self, ExecutionContext, InFlightState};
use crate::credentials::TokenSet;
use crate::error::{Error, Result};
use crate::exchange::{fetch_token, validate_token};
use crate::identity::InstanceId;
use crate::interrupt::Interrupt;
use crate::store::{CredentialStore, MemoryCredentialStore, Namespace};

type ContextFn<A> = Arc<dyn Fn(&A) -> ExecutionContext + Send + Sync>;
type ExecuteFn<A, T> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Delegated-credential authorizer for one protected capability.
///
/// # Example
///
/// ```rust
/// use toolvault_core::{
///     context, AuthorizerConfig, ClientIdentity, ExecutionContext, TokenVaultAuthorizer,
/// };
///
/// struct CheckCalendar {
///     thread_id: String,
///     refresh_token: String,
/// }
///
/// let config = AuthorizerConfig::<CheckCalendar>::builder("google-oauth2")
///     .scope("https://www.googleapis.com/auth/calendar.freebusy")
///     .refresh_token(|args: &CheckCalendar| {
///         let token = args.refresh_token.clone();
///         async move { Some(token) }
///     })
///     .build()
///     .unwrap();
///
/// let authorizer =
///     TokenVaultAuthorizer::new(ClientIdentity::new("tenant.us.auth0.com"), config).unwrap();
///
/// let check = authorizer.protect(
///     |args: &CheckCalendar| ExecutionContext::thread(args.thread_id.clone()),
///     |_args: CheckCalendar| async move {
///         let token = context::access_token()?;
///         // call the calendar API with `token`
///         Ok::<_, toolvault_core::Error>(token.len())
///     },
/// );
/// # let _ = check;
/// ```
pub struct TokenVaultAuthorizer<A> {
    client: ClientIdentity,
    config: AuthorizerConfig<A>,
    instance_id: InstanceId,
    exchange: ExchangeClient,
    cache: CredentialCache,
}

impl<A> TokenVaultAuthorizer<A> {
    /// Validate `config` against `client` and build an authorizer backed by
    /// an in-memory credential store.
    pub fn new(client: ClientIdentity, config: AuthorizerConfig<A>) -> Result<Self> {
        config.validate_for(&client)?;

        let instance_id = InstanceId::compute(&client, &config);
        let exchange = client.exchange_client()?;
        let cache = CredentialCache::new(
            Arc::new(MemoryCredentialStore::new()),
            instance_id.clone(),
        );

        log::debug!(
            "Created token vault authorizer {} for connection '{}'",
            instance_id,
            config.connection()
        );

        Ok(Self {
            client,
            config,
            instance_id,
            exchange,
            cache,
        })
    }

    /// Use `store` for cached credentials.
    pub fn with_store(self, store: impl CredentialStore + 'static) -> Self {
        self.with_shared_store(Arc::new(store))
    }

    /// Use a store shared with other authorizers.
    ///
    /// Entries stay isolated per authorizer through the instance identity.
    pub fn with_shared_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.cache = CredentialCache::new(store, self.instance_id.clone());
        self
    }

    /// Use a preconfigured token endpoint client.
    pub fn with_exchange_client(mut self, exchange: ExchangeClient) -> Self {
        self.exchange = exchange;
        self
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    pub fn config(&self) -> &AuthorizerConfig<A> {
        &self.config
    }

    pub fn client(&self) -> &ClientIdentity {
        &self.client
    }

    pub fn cache(&self) -> &CredentialCache {
        &self.cache
    }

    fn in_flight_state(&self, context: ExecutionContext) -> InFlightState {
        InFlightState::new(
            context,
            self.config.connection(),
            self.config.scopes().to_vec(),
            self.config.authorization_params().cloned(),
        )
    }

    /// Resolve the credential for the active call and attach it to `state`.
    async fn authorize(
        &self,
        state: &InFlightState,
        namespace: &Namespace,
        args: &A,
    ) -> Result<()> {
        let credentials = match self.cache.get(namespace).await? {
            Some(cached) => {
                log::debug!(
                    "Credential cache hit for connection '{}'",
                    self.config.connection()
                );
                state.set_current_scopes(cached.granted_scopes());
                cached
            }
            None => {
                log::debug!(
                    "Credential cache miss for connection '{}'",
                    self.config.connection()
                );
                let response =
                    validate_token(state, fetch_token(&self.exchange, &self.config, args).await)?;
                let credentials = TokenSet::from(response);
                self.cache.put(namespace, credentials.clone()).await?;
                log::info!(
                    "Obtained credential for connection '{}' (expires in {:?}s)",
                    self.config.connection(),
                    credentials.expires_in
                );
                credentials
            }
        };

        state.set_credentials(credentials);
        Ok(())
    }

    async fn invalidate(&self, namespace: &Namespace) {
        if let Err(e) = self.cache.delete(namespace).await {
            log::warn!(
                "Failed to invalidate cached credential for connection '{}': {}",
                self.config.connection(),
                e
            );
        }
    }

    async fn run_protected<T>(
        &self,
        state: &InFlightState,
        args: A,
        execute: &(dyn Fn(A) -> BoxFuture<'static, Result<T>> + Send + Sync),
    ) -> Result<T> {
        let namespace = self
            .cache
            .namespace(state.context(), self.config.credentials_context())?;

        let result = match self.authorize(state, &namespace, &args).await {
            Ok(()) => execute(args).await,
            Err(e) => Err(e),
        };

        match result {
            Err(Error::Unauthorized(message)) => {
                log::warn!(
                    "Downstream API rejected the credential for connection '{}': {}",
                    self.config.connection(),
                    message
                );
                self.invalidate(&namespace).await;
                Err(Interrupt::rejected(
                    self.config.connection(),
                    message,
                    self.config.scopes(),
                    state.current_scopes(),
                    self.config.authorization_params().cloned(),
                )
                .into())
            }
            Err(Error::Interrupt(interrupt)) => {
                self.invalidate(&namespace).await;
                Err(Error::Interrupt(interrupt))
            }
            other => other,
        }
    }
}

impl<A> TokenVaultAuthorizer<A>
where
    A: Send + Sync + 'static,
{
    /// Wrap `execute` so that it runs with this authorizer's credential.
    ///
    /// `get_context` derives the caching key from the call arguments. Inside
    /// `execute`, [`context::access_token`] returns the third-party token.
    /// Returning [`Error::Unauthorized`] from `execute` evicts the cached
    /// credential and turns into an `authorization_missing` interrupt that
    /// carries the API's message.
    pub fn protect<C, E, Fut, T>(&self, get_context: C, execute: E) -> Protected<A, T>
    where
        C: Fn(&A) -> ExecutionContext + Send + Sync + 'static,
        E: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        Protected {
            authorizer: Arc::new(self.clone()),
            get_context: Arc::new(get_context),
            execute: Arc::new(move |args: A| -> BoxFuture<'static, Result<T>> {
                Box::pin(execute(args))
            }),
        }
    }
}

impl<A> Clone for TokenVaultAuthorizer<A> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            config: self.config.clone(),
            instance_id: self.instance_id.clone(),
            exchange: self.exchange.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<A> std::fmt::Debug for TokenVaultAuthorizer<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVaultAuthorizer")
            .field("client", &self.client)
            .field("config", &self.config)
            .field("instance_id", &self.instance_id)
            .finish_non_exhaustive()
    }
}

/// A tool callable guarded by a [`TokenVaultAuthorizer`].
pub struct Protected<A, T> {
    authorizer: Arc<TokenVaultAuthorizer<A>>,
    get_context: ContextFn<A>,
    execute: ExecuteFn<A, T>,
}

impl<A, T> Protected<A, T>
where
    A: Send + Sync + 'static,
    T: Send + 'static,
{
    /// Invoke the wrapped callable.
    ///
    /// Fails with [`Error::NestedCall`] when made from inside another
    /// protected call, and with [`Error::Interrupt`] when the user must
    /// (re-)authorize the connection.
    ///
    /// Nesting is tracked per Tokio task. A call made from a task that the
    /// outer callable started with `tokio::spawn` runs as an independent
    /// call; see [`context::run`].
    pub async fn call(&self, args: A) -> Result<T> {
        let state = Arc::new(self.authorizer.in_flight_state((self.get_context)(&args)));
        let authorizer = Arc::clone(&self.authorizer);
        let execute = Arc::clone(&self.execute);

        let scoped = Arc::clone(&state);
        context::run(state, async move {
            authorizer
                .run_protected(&scoped, args, &*execute)
                .await
        })
        .await?
    }

    pub fn authorizer(&self) -> &TokenVaultAuthorizer<A> {
        &self.authorizer
    }
}

impl<A, T> Clone for Protected<A, T> {
    fn clone(&self) -> Self {
        Self {
            authorizer: Arc::clone(&self.authorizer),
            get_context: Arc::clone(&self.get_context),
            execute: Arc::clone(&self.execute),
        }
    }
}

impl<A, T> std::fmt::Debug for Protected<A, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Protected")
            .field("authorizer", &self.authorizer)
            .finish_non_exhaustive()
    }
}
