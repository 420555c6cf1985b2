use super::{
    AuthResult, AuthSession, SessionFeed, SessionPersistence, SignUpOutcome, SupabaseAuthClient,
};

/// Auth client that publishes every session transition on a [`SessionFeed`].
#[derive(Clone)]
pub struct AuthService<S: SessionPersistence> {
    client: SupabaseAuthClient<S>,
    feed: SessionFeed,
}

impl<S: SessionPersistence> AuthService<S> {
    pub const fn new(client: SupabaseAuthClient<S>, feed: SessionFeed) -> Self {
        Self { client, feed }
    }

    pub const fn feed(&self) -> &SessionFeed {
        &self.feed
    }

    /// Loads the persisted session (refreshing it if needed) and publishes
    /// the result, including `None` when nobody is signed in.
    pub async fn restore_session(&self) -> AuthResult<Option<AuthSession>> {
        let session = self.client.restore_session().await?;
        self.feed.publish(session.clone());
        Ok(session)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        let session = self.client.sign_in(email, password).await.map_err(|error| {
            tracing::error!("Error signing in: {}", error);
            error
        })?;
        tracing::info!("User signed in: {}", session.user.id);
        self.feed.publish(Some(session.clone()));
        Ok(session)
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> AuthResult<SignUpOutcome> {
        let outcome = self.client.sign_up(email, password).await.map_err(|error| {
            tracing::error!("Error signing up: {}", error);
            error
        })?;
        if let SignUpOutcome::SignedIn(session) = &outcome {
            tracing::info!("User signed up: {}", session.user.id);
            self.feed.publish(Some(session.clone()));
        }
        Ok(outcome)
    }

    /// Signs out at the provider and publishes `None`. A no-op when no
    /// session is active.
    pub async fn sign_out(&self) -> AuthResult<()> {
        let Some(current) = self.feed.current() else {
            return Ok(());
        };
        self.client
            .sign_out(&current.access_token)
            .await
            .map_err(|error| {
                tracing::error!("Error signing out: {}", error);
                error
            })?;
        tracing::info!("User signed out");
        self.feed.publish(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::{session_for, MemorySessionStore};

    fn service(url: &str, store: MemorySessionStore) -> AuthService<MemorySessionStore> {
        AuthService::new(
            SupabaseAuthClient::new(url, "anon", store).unwrap(),
            SessionFeed::new(),
        )
    }

    #[tokio::test]
    async fn restore_publishes_persisted_session() {
        let store = MemorySessionStore::default();
        store.save_session(&session_for("u1")).unwrap();
        let auth = service("http://127.0.0.1:9", store);

        let restored = auth.restore_session().await.unwrap();
        assert_eq!(restored.unwrap().user_id(), "u1");
        assert_eq!(auth.feed().current_user_id().as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn restore_refreshes_expired_session_and_publishes_it() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/auth/v1/token")
            .match_query(mockito::Matcher::UrlEncoded(
                "grant_type".into(),
                "refresh_token".into(),
            ))
            .with_status(200)
            .with_body(
                r#"{"access_token":"fresh","refresh_token":"r2","expires_in":3600,
                    "user":{"id":"u1","email":null}}"#,
            )
            .create_async()
            .await;

        let store = MemorySessionStore::default();
        let mut expired = session_for("u1");
        expired.expires_at = 0;
        store.save_session(&expired).unwrap();
        let auth = service(&server.url(), store.clone());

        let restored = auth.restore_session().await.unwrap().unwrap();
        mock.assert_async().await;
        assert_eq!(restored.access_token, "fresh");
        assert_eq!(
            auth.feed().current().map(|session| session.access_token),
            Some("fresh".to_string())
        );
        assert_eq!(store.stored(), Some(restored));
    }

    #[tokio::test]
    async fn sign_out_publishes_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/v1/logout")
            .with_status(204)
            .create_async()
            .await;

        let store = MemorySessionStore::default();
        let auth = service(&server.url(), store.clone());
        store.save_session(&session_for("u1")).unwrap();
        auth.restore_session().await.unwrap();

        auth.sign_out().await.unwrap();
        assert!(auth.feed().current().is_none());
        assert!(store.stored().is_none());
    }

    #[tokio::test]
    async fn failed_sign_in_publishes_nothing() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/v1/token")
            .match_query(mockito::Matcher::Any)
            .with_status(400)
            .with_body(r#"{"msg":"Invalid login credentials"}"#)
            .create_async()
            .await;

        let auth = service(&server.url(), MemorySessionStore::default());
        assert!(auth.sign_in("a@example.com", "bad").await.is_err());
        assert!(auth.feed().current().is_none());
    }
}
