//! High-level client API.

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::error::ClientError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;
use vndb_protocol::reply::{parse_dbstats, parse_results};
use vndb_protocol::{Command, DbStats, GetQuery, LoginRequest, Results, SetRequest};

/// High-level client for the VNDB API.
///
/// Cheap to clone; clones share one connection and its request queue.
#[derive(Clone)]
pub struct Client {
    conn: Arc<Connection>,
}

impl Client {
    /// Connects to the server and logs in when the config carries a login.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, ClientError> {
        let client = Self::from_connection(Connection::connect(config).await?);

        if let Some(login) = config.login.clone() {
            tracing::debug!(
                "[{}] logging in as {}",
                client.session_id(),
                login.username.as_deref().unwrap_or("anonymous")
            );
            client.login(login).await?;
        }

        Ok(client)
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(conn),
        }
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> Arc<Connection> {
        self.conn.clone()
    }

    pub fn session_id(&self) -> Uuid {
        self.conn.session_id()
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.conn.close().await
    }

    // =========================================================================
    // Commands
    // =========================================================================

    pub async fn login(&self, login: LoginRequest) -> Result<(), ClientError> {
        self.conn.issue(login.into()).await?;
        Ok(())
    }

    /// Fetches database statistics.
    pub async fn dbstats(&self) -> Result<DbStats, ClientError> {
        self.conn.issue_with(Command::DbStats, parse_dbstats).await
    }

    /// Fetches one page of items.
    pub async fn get(&self, query: GetQuery) -> Result<Results, ClientError> {
        self.get_as::<Value>(query).await
    }

    /// Fetches one page of items, decoding each item as `T`.
    pub async fn get_as<T: DeserializeOwned + Send + 'static>(
        &self,
        query: GetQuery,
    ) -> Result<Results<T>, ClientError> {
        self.conn
            .issue_with(Command::from(query), parse_results::<T>)
            .await
    }

    pub async fn set(&self, request: SetRequest) -> Result<(), ClientError> {
        self.conn.issue(request.into()).await?;
        Ok(())
    }

    /// Sends a raw message and returns the raw reply line.
    pub async fn write(&self, message: &str) -> Result<String, ClientError> {
        self.conn.write(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_READ_BUFFER_SIZE;
    use serde::Deserialize;
    use serde_json::json;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
    use tokio::net::TcpListener;
    use vndb_protocol::{Decoder, Encoder};

    fn client() -> (Client, DuplexStream) {
        let (transport, server) = tokio::io::duplex(4096);
        let conn = Connection::from_stream(transport, DEFAULT_READ_BUFFER_SIZE);
        (Client::from_connection(conn), server)
    }

    /// Answers each request with the scripted reply and returns what was received.
    async fn serve<S>(mut server: S, replies: Vec<&'static str>) -> Vec<String>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut decoder = Decoder::new();
        let mut received = Vec::new();
        let mut replies = replies.into_iter();
        let mut buf = [0u8; 512];

        loop {
            while let Some(line) = decoder.decode_line().unwrap() {
                received.push(line);
                match replies.next() {
                    Some(reply) => server
                        .write_all(&Encoder::encode_message(reply).unwrap())
                        .await
                        .unwrap(),
                    None => return received,
                }
            }
            let n = server.read(&mut buf).await.unwrap();
            if n == 0 {
                return received;
            }
            decoder.extend(&buf[..n]);
        }
    }

    #[tokio::test]
    async fn test_dbstats() {
        let (client, server) = client();
        let server = tokio::spawn(serve(server, vec![r#"dbstats {"vn":30000,"tags":2500}"#]));

        let stats = client.dbstats().await.unwrap();
        assert_eq!(stats["vn"], json!(30000));
        assert_eq!(stats["tags"], json!(2500));

        client.close().await.unwrap();
        assert_eq!(server.await.unwrap(), vec!["dbstats"]);
    }

    #[tokio::test]
    async fn test_get_typed_items() {
        #[derive(Debug, Deserialize)]
        struct Vn {
            id: u64,
            title: String,
        }

        let (client, server) = client();
        let server = tokio::spawn(serve(
            server,
            vec![r#"results {"num":1,"more":false,"items":[{"id":17,"title":"Ever17"}]}"#],
        ));

        let query = GetQuery::new("vn", "basic", "id = 17").with_option("page", 2);
        let results: Results<Vn> = client.get_as(query).await.unwrap();
        assert_eq!(results.num, 1);
        assert_eq!(results.items[0].id, 17);
        assert_eq!(results.items[0].title, "Ever17");

        client.close().await.unwrap();
        assert_eq!(
            server.await.unwrap(),
            vec![r#"get vn basic (id = 17) {"page":2}"#]
        );
    }

    #[tokio::test]
    async fn test_server_error() {
        let (client, server) = client();
        tokio::spawn(serve(
            server,
            vec![r#"error {"id":"needlogin","msg":"Not logged in."}"#],
        ));

        let err = client
            .set(SetRequest::new("votelist", 17).with_field("vote", 88))
            .await
            .unwrap_err();
        assert_eq!(err.server_detail().unwrap().id, "needlogin");
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_wrong_reply_kind() {
        let (client, server) = client();
        tokio::spawn(serve(server, vec!["ok"]));

        let err = client.dbstats().await.unwrap_err();
        assert_eq!(err.to_string(), "protocol error: Unexpected response: ok");
    }

    #[tokio::test]
    async fn test_get_argument_error_not_sent() {
        let (client, server) = client();
        let server = tokio::spawn(serve(server, vec![r#"dbstats {"vn":1}"#]));

        let err = client
            .get(GetQuery::new("", "basic", "id = 1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Argument(_)));
        assert_eq!(
            err.to_string(),
            "invalid argument: Get command is missing type argument(s)."
        );

        client.dbstats().await.unwrap();
        client.close().await.unwrap();
        assert_eq!(server.await.unwrap(), vec!["dbstats"]);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_queue() {
        let (client, server) = client();
        let server = tokio::spawn(serve(
            server,
            vec![
                r#"results {"num":1,"more":false,"items":[{"id":1}]}"#,
                r#"results {"num":1,"more":false,"items":[{"id":2}]}"#,
            ],
        ));

        let other = client.clone();
        let (first, second) = tokio::join!(
            client.get(GetQuery::new("vn", "basic", "id = 1")),
            other.get(GetQuery::new("vn", "basic", "id = 2")),
        );
        assert_eq!(first.unwrap().items, vec![json!({"id": 1})]);
        assert_eq!(second.unwrap().items, vec![json!({"id": 2})]);

        client.close().await.unwrap();
        assert_eq!(
            server.await.unwrap(),
            vec!["get vn basic (id = 1)", "get vn basic (id = 2)"]
        );
    }

    #[tokio::test]
    async fn test_connect_logs_in() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            serve(socket, vec!["ok", r#"dbstats {"vn":1}"#]).await
        });

        let config = ConnectionConfig::new("127.0.0.1", port)
            .with_plaintext()
            .with_client("vndb-tests", "0.1.0");
        let client = Client::connect(&config).await.unwrap();
        client.dbstats().await.unwrap();
        client.close().await.unwrap();

        let received = server.await.unwrap();
        assert_eq!(received.len(), 2);
        let (command, body) = received[0].split_once(' ').unwrap();
        assert_eq!(command, "login");
        let body: Value = serde_json::from_str(body).unwrap();
        assert_eq!(
            body,
            json!({"protocol": 1, "client": "vndb-tests", "clientver": "0.1.0"})
        );
        assert_eq!(received[1], "dbstats");
    }

    #[tokio::test]
    async fn test_connect_login_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            serve(socket, vec![r#"error {"id":"auth","msg":"Wrong password"}"#]).await
        });

        let config = ConnectionConfig::new("127.0.0.1", port)
            .with_plaintext()
            .with_login(LoginRequest::new("vndb-tests", "0.1.0").with_credentials("user", "bad"));
        let err = match Client::connect(&config).await {
            Ok(_) => panic!("login should fail"),
            Err(e) => e,
        };
        assert_eq!(err.server_detail().unwrap().msg, "Wrong password");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = ConnectionConfig::new("127.0.0.1", port).with_plaintext();
        assert!(matches!(
            Client::connect(&config).await,
            Err(ClientError::Io(_))
        ));
    }
}
