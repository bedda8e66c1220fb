//! # Request Dispatcher
//!
//! Turns an action call into a network round trip and hands the caller a
//! [`Pending`] handle right away. The handle owns a shared placeholder that is
//! filled in place when the call settles, so a handle taken before resolution
//! (for example a collection bound to a view) stays valid afterwards.
//!
//! One settlement drives both ways of observing the outcome:
//!
//! ```text
//! Dispatcher::invoke ──► Pending { placeholder, slot, settled }
//!        │                                ▲
//!        └─ tokio task: stub? ─ decorate ─ send ─ settle placeholder
//!                                               ├─ run callbacks (once)
//!                                               └─ wake `.await`
//! ```
//!
//! Callbacks registered after settlement run immediately.

use crate::action::{scalar_text, ActionDef, Params};
use crate::config::SdkConfig;
use crate::error::{HttpFailure, Result, SdkError};
use crate::instance::{Collection, Instance};
use crate::session::SessionManager;
use crate::transport::Transport;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde_json::Value;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// A value shared between the caller and the task that fills it in.
pub struct Shared<T>(Arc<RwLock<T>>);

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.0.write()
    }

    /// True when both handles point at the same placeholder.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: Clone> Shared<T> {
    pub fn snapshot(&self) -> T {
        self.0.read().clone()
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Shared").field(&*self.0.read()).finish()
    }
}

/// Result shapes a placeholder can be settled into.
pub trait Settle: Clone + Send + Sync + 'static {
    /// Overwrites `self` with `body`, tagging records with `model`.
    fn settle(&mut self, model: &str, body: Value) -> Result<()>;
}

impl Settle for Instance {
    fn settle(&mut self, model: &str, body: Value) -> Result<()> {
        match body {
            Value::Object(fields) => {
                self.replace(model, fields);
                Ok(())
            }
            other => Err(malformed("an object", &other)),
        }
    }
}

impl Settle for Collection {
    fn settle(&mut self, model: &str, body: Value) -> Result<()> {
        let items = match body {
            Value::Array(items) => items,
            other => return Err(malformed("an array", &other)),
        };
        let mut records = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::Object(fields) => records.push(Instance::new(model, fields)),
                other => return Err(malformed("an array of objects", &other)),
            }
        }
        // In place, so earlier handles observe the new elements.
        self.clear();
        self.extend(records);
        Ok(())
    }
}

impl Settle for () {
    fn settle(&mut self, _model: &str, _body: Value) -> Result<()> {
        Ok(())
    }
}

fn malformed(expected: &str, body: &Value) -> SdkError {
    SdkError::Transport(format!("malformed response body: expected {expected}, got {body}"))
}

type SuccessHook<T> = Box<dyn FnOnce(T) + Send>;
type ErrorHook = Box<dyn FnOnce(SdkError) + Send>;

enum Slot<T> {
    Waiting {
        on_success: Vec<SuccessHook<T>>,
        on_error: Vec<ErrorHook>,
    },
    Settled(Result<()>),
}

/// Handle to an in-flight call.
///
/// Await it for the settled value, register callbacks, or both. Dropping it
/// does not cancel the call; the placeholder is still filled in.
pub struct Pending<T: Settle> {
    placeholder: Shared<T>,
    slot: Arc<Mutex<Slot<T>>>,
    settled: oneshot::Receiver<Result<()>>,
}

impl<T: Settle> Pending<T> {
    pub(crate) fn new(placeholder: Shared<T>) -> (Self, Settler<T>) {
        let slot = Arc::new(Mutex::new(Slot::Waiting {
            on_success: Vec::new(),
            on_error: Vec::new(),
        }));
        let (notify, settled) = oneshot::channel();
        let settler = Settler {
            placeholder: placeholder.clone(),
            slot: Arc::clone(&slot),
            notify,
        };
        (
            Self {
                placeholder,
                slot,
                settled,
            },
            settler,
        )
    }

    /// A handle that has already failed, for calls rejected before dispatch.
    pub(crate) fn failed(placeholder: Shared<T>, error: SdkError) -> Self {
        let (pending, settler) = Self::new(placeholder);
        let _ = settler.settle("", Err(error));
        pending
    }

    /// The value being filled in. Available before the call settles.
    pub fn placeholder(&self) -> &Shared<T> {
        &self.placeholder
    }

    /// Runs `callback` with the settled value if the call succeeds.
    pub fn on_success<F>(self, callback: F) -> Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        let run_now = {
            let mut slot = self.slot.lock();
            match &mut *slot {
                Slot::Waiting { on_success, .. } => {
                    on_success.push(Box::new(callback));
                    None
                }
                Slot::Settled(Ok(())) => Some(callback),
                Slot::Settled(Err(_)) => None,
            }
        };
        if let Some(callback) = run_now {
            callback(self.placeholder.snapshot());
        }
        self
    }

    /// Runs `callback` with the error if the call fails.
    pub fn on_error<F>(self, callback: F) -> Self
    where
        F: FnOnce(SdkError) + Send + 'static,
    {
        let run_now = {
            let mut slot = self.slot.lock();
            match &mut *slot {
                Slot::Waiting { on_error, .. } => {
                    on_error.push(Box::new(callback));
                    None
                }
                Slot::Settled(Err(error)) => Some((callback, error.clone())),
                Slot::Settled(Ok(())) => None,
            }
        };
        if let Some((callback, error)) = run_now {
            callback(error);
        }
        self
    }

    pub fn is_settled(&self) -> bool {
        matches!(*self.slot.lock(), Slot::Settled(_))
    }
}

impl<T: Settle + fmt::Debug> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("placeholder", &self.placeholder)
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl<T: Settle> IntoFuture for Pending<T> {
    type Output = Result<T>;
    type IntoFuture = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            let outcome = self.settled.await.map_err(|_| SdkError::Abandoned)?;
            outcome?;
            Ok(self.placeholder.snapshot())
        })
    }
}

/// The task-side half of a [`Pending`].
pub(crate) struct Settler<T: Settle> {
    placeholder: Shared<T>,
    slot: Arc<Mutex<Slot<T>>>,
    notify: oneshot::Sender<Result<()>>,
}

impl<T: Settle> Settler<T> {
    /// Fills the placeholder, fires the callbacks, then wakes the awaiter.
    pub(crate) fn settle(self, model: &str, outcome: Result<Value>) -> Result<()> {
        let outcome = outcome.and_then(|body| self.placeholder.write().settle(model, body));

        let hooks = std::mem::replace(&mut *self.slot.lock(), Slot::Settled(outcome.clone()));
        if let Slot::Waiting {
            on_success,
            on_error,
        } = hooks
        {
            match &outcome {
                Ok(()) => {
                    for hook in on_success {
                        hook(self.placeholder.snapshot());
                    }
                }
                Err(error) => {
                    for hook in on_error {
                        hook(error.clone());
                    }
                }
            }
        }

        // The receiver is gone when the caller dropped the handle.
        let _ = self.notify.send(outcome.clone());
        outcome
    }
}

/// How a settled call changes the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionEffect {
    #[default]
    None,
    /// Store the returned access token.
    Login { remember_me: bool },
    /// Forget the credential before the request goes out.
    Logout,
    /// Cache the returned user record.
    CurrentUser,
}

/// One action call, ready to dispatch.
#[derive(Debug, Clone)]
pub struct Call {
    pub action: Arc<ActionDef>,
    /// Tag for the records the call returns.
    pub model: String,
    pub base_path: String,
    pub params: Params,
    pub body: Option<Value>,
    pub effect: SessionEffect,
}

impl Call {
    pub fn new(
        action: Arc<ActionDef>,
        model: impl Into<String>,
        base_path: impl Into<String>,
    ) -> Self {
        Self {
            action,
            model: model.into(),
            base_path: base_path.into(),
            params: Params::new(),
            body: None,
            effect: SessionEffect::None,
        }
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn effect(mut self, effect: SessionEffect) -> Self {
        self.effect = effect;
        self
    }
}

/// Sends calls through a [`Transport`] on behalf of one application scope.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    session: Arc<SessionManager>,
    clear_on_unauthorized: bool,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        session: Arc<SessionManager>,
        config: &SdkConfig,
    ) -> Self {
        Self {
            transport,
            session,
            clear_on_unauthorized: config.clear_session_on_unauthorized,
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Starts `call` on its own task and returns the handle to it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn invoke<T: Settle>(&self, call: Call, placeholder: Shared<T>) -> Pending<T> {
        let (pending, settler) = Pending::new(placeholder);
        let transport = Arc::clone(&self.transport);
        let session = Arc::clone(&self.session);
        let clear_on_unauthorized = self.clear_on_unauthorized;

        tokio::spawn(async move {
            let model = call.model.clone();
            let action = call.action.name.clone();
            let outcome = execute(transport.as_ref(), &session, clear_on_unauthorized, call).await;
            if let Err(error) = settler.settle(&model, outcome) {
                warn!(
                    model = %model,
                    action = %action,
                    status = ?error.status(),
                    error = %error,
                    "Call failed"
                );
            }
        });

        pending
    }
}

async fn execute(
    transport: &dyn Transport,
    session: &SessionManager,
    clear_on_unauthorized: bool,
    call: Call,
) -> Result<Value> {
    let Call {
        action,
        model,
        base_path,
        params,
        body,
        effect,
    } = call;

    if session.should_stub(&action) {
        debug!(model = %model, action = %action.name, "No current user, answering 401 locally");
        return Err(HttpFailure::stub_unauthorized().into());
    }

    let authenticated = session.is_authenticated();
    let request = session.decorate_request(action.build_request(&base_path, params, body));
    debug!(
        model = %model,
        action = %action.name,
        method = %request.method,
        path = %request.path,
        authenticated,
        "Dispatching"
    );

    // The decorated request still carries the token the server must revoke.
    if effect == SessionEffect::Logout {
        session.clear_credential();
    }

    let response = transport.send(request).await?;
    if !response.is_success() {
        let failure = HttpFailure::from_response(response.status, response.headers, response.body);
        if failure.status == 401
            && authenticated
            && clear_on_unauthorized
            && effect != SessionEffect::Logout
        {
            warn!(model = %model, action = %action.name, "Access token rejected, clearing session");
            session.clear_credential();
        }
        return Err(failure.into());
    }

    match effect {
        SessionEffect::Login { remember_me } => store_login(session, &response.body, remember_me)?,
        SessionEffect::CurrentUser => session.set_current_user_data(response.body.clone()),
        SessionEffect::None | SessionEffect::Logout => {}
    }

    info!(model = %model, action = %action.name, status = response.status, "Call settled");
    Ok(response.body)
}

fn store_login(session: &SessionManager, body: &Value, remember_me: bool) -> Result<()> {
    let field = |name: &str| body.get(name).filter(|value| !value.is_null()).map(scalar_text);
    match (field("id"), field("userId")) {
        (Some(token), Some(user_id)) => {
            session.set_credential(token, user_id, remember_me);
            if let Some(user) = body.get("user").filter(|user| user.is_object()) {
                session.set_current_user_data(user.clone());
            }
            Ok(())
        }
        _ => Err(SdkError::Transport(
            "login response carries no access token".into(),
        )),
    }
}
