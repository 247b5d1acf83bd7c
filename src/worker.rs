use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::TxnError;
use crate::result::Execution;
use crate::session::{Boundary, CancelToken, Session, SessionStatus};
use crate::store::TxnStore;

const REQUEST_QUEUE_DEPTH: usize = 16;

enum Request<S: TxnStore> {
    Execute {
        boundary: Boundary<'static, S>,
        cancel: CancelToken,
        reply: oneshot::Sender<Execution>,
    },
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Runs one session on a dedicated blocking task, so store calls never
/// stall the async runtime and statements are strictly sequential.
pub struct SessionWorker;

impl SessionWorker {
    /// Must be called from within a tokio runtime.
    pub fn spawn<S>(session: Session<S>) -> (SessionClient<S>, JoinHandle<()>)
    where
        S: TxnStore + Send + 'static,
        S::Handle: Send,
        S::Token: Send,
    {
        let (tx, mut rx) = mpsc::channel::<Request<S>>(REQUEST_QUEUE_DEPTH);
        let current: Arc<Mutex<Option<CancelToken>>> = Arc::new(Mutex::new(None));
        let client = SessionClient {
            tx,
            current: current.clone(),
            default_deadline: session.config().statement_timeout(),
        };

        let handle = tokio::task::spawn_blocking(move || {
            let mut session = session;
            let mut close_reply = None;
            debug!("Session {} worker started", session.id());

            while let Some(request) = rx.blocking_recv() {
                match request {
                    Request::Execute { boundary, cancel, reply } => {
                        set_current(&current, Some(cancel.clone()));
                        let execution = session.execute_cancellable(boundary, &cancel);
                        set_current(&current, None);
                        if reply.send(execution).is_err() {
                            debug!("Session {}: client stopped waiting for a result", session.id());
                        }
                    }
                    Request::Status { reply } => {
                        let _ = reply.send(session.status());
                    }
                    Request::Close { reply } => {
                        close_reply = Some(reply);
                        break;
                    }
                }
            }

            let id = session.id();
            drop(session);
            debug!("Session {} worker stopped", id);
            if let Some(reply) = close_reply {
                let _ = reply.send(());
            }
        });

        (client, handle)
    }
}

fn set_current(current: &Mutex<Option<CancelToken>>, token: Option<CancelToken>) {
    match current.lock() {
        Ok(mut guard) => *guard = token,
        Err(_) => warn!("Failed to acquire in-flight statement lock"),
    }
}

/// Handle used to submit statements to a [`SessionWorker`].
pub struct SessionClient<S: TxnStore> {
    tx: mpsc::Sender<Request<S>>,
    current: Arc<Mutex<Option<CancelToken>>>,
    default_deadline: Option<Duration>,
}

impl<S: TxnStore> Clone for SessionClient<S> {
    fn clone(&self) -> Self {
        SessionClient {
            tx: self.tx.clone(),
            current: self.current.clone(),
            default_deadline: self.default_deadline,
        }
    }
}

impl<S: TxnStore> SessionClient<S> {
    async fn submit(
        &self,
        boundary: Boundary<'static, S>,
        cancel: CancelToken,
    ) -> Result<oneshot::Receiver<Execution>, TxnError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Execute { boundary, cancel, reply })
            .await
            .map_err(|_| TxnError::SessionClosed)?;
        Ok(rx)
    }

    /// Executes `boundary`, applying the configured statement timeout if any.
    pub async fn execute(&self, boundary: Boundary<'static, S>) -> Result<Execution, TxnError> {
        match self.default_deadline {
            Some(deadline) => self.execute_with_deadline(boundary, deadline).await,
            None => {
                let rx = self.submit(boundary, CancelToken::new()).await?;
                rx.await.map_err(|_| TxnError::SessionClosed)
            }
        }
    }

    /// Executes `boundary`, canceling it once `deadline` has passed. The
    /// result of the canceled statement is still awaited and returned.
    pub async fn execute_with_deadline(
        &self,
        boundary: Boundary<'static, S>,
        deadline: Duration,
    ) -> Result<Execution, TxnError> {
        let cancel = CancelToken::new();
        let mut rx = self.submit(boundary, cancel.clone()).await?;
        match tokio::time::timeout(deadline, &mut rx).await {
            Ok(reply) => reply.map_err(|_| TxnError::SessionClosed),
            Err(_) => {
                warn!("Statement exceeded deadline of {:?}; canceling", deadline);
                cancel.cancel();
                rx.await.map_err(|_| TxnError::SessionClosed)
            }
        }
    }

    /// Cancels the statement currently executing, if there is one.
    pub fn cancel(&self) {
        match self.current.lock() {
            Ok(guard) => {
                if let Some(token) = guard.as_ref() {
                    token.cancel();
                }
            }
            Err(_) => warn!("Failed to acquire in-flight statement lock"),
        }
    }

    pub async fn status(&self) -> Result<SessionStatus, TxnError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Status { reply })
            .await
            .map_err(|_| TxnError::SessionClosed)?;
        rx.await.map_err(|_| TxnError::SessionClosed)
    }

    /// Stops the worker and drops its session, aborting any open
    /// transaction. Resolves once the session is gone.
    pub async fn close(&self) -> Result<(), TxnError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Close { reply })
            .await
            .map_err(|_| TxnError::SessionClosed)?;
        rx.await.map_err(|_| TxnError::SessionClosed)
    }
}
