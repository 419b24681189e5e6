//! Modules, version groups and a database plugin.
//!
//! `MemoryConnector` stands in for a real driver binding so the demo runs
//! without a database server.

use std::sync::Arc;

use serde_json::Value;
use tweb::database::{
    Connection, ConnectionConfig, Connector, Database, DatabasePlugin, DriverError, ResultSet,
};
use tweb::{Method, Request, Response, Router, ServerError};

struct MemoryConnection {
    users: Arc<Vec<(i64, &'static str)>>,
}

impl Connection for MemoryConnection {
    fn execute(&mut self, sql: &str, _params: &[Value]) -> Result<ResultSet, DriverError> {
        if sql.starts_with("SET SESSION") {
            return Ok(ResultSet::default());
        }
        let rows = self
            .users
            .iter()
            .map(|(id, name)| vec![Value::from(*id), Value::from(*name)])
            .collect();
        Ok(ResultSet::new(vec!["id".into(), "name".into()], rows))
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    fn ping(&mut self) -> bool {
        true
    }

    fn close(&mut self) {}
}

struct MemoryConnector {
    users: Arc<Vec<(i64, &'static str)>>,
}

impl Connector for MemoryConnector {
    type Conn = MemoryConnection;

    fn connect(&self, config: &ConnectionConfig) -> Result<MemoryConnection, DriverError> {
        println!("connecting to {}", config.address());
        Ok(MemoryConnection {
            users: self.users.clone(),
        })
    }
}

#[tokio::main]
async fn main() {
    let connector = MemoryConnector {
        users: Arc::new(vec![(1, "ann"), (2, "bob")]),
    };
    let db = Database::open(connector, "mysql+pool://root:pw@127.0.0.1/app?max_connections=4", None)
        .expect("invalid database url");

    let mut router = Router::new();
    router.plugin(DatabasePlugin::new(db));

    router
        .register_module("user", "/user")
        .route(Method::GET, &["/list", "^/users"], &["/v1", "/v2"], |req: Request| async move {
            let db = req
                .plugins
                .get::<DatabasePlugin<MemoryConnector>>()
                .ok_or_else(|| ServerError::InternalError("database plugin missing".into()))?;
            let rows = db.execute("SELECT id, name FROM users", &[])?;
            Response::success("ok", &rows.records())
        })
        .get("/:id", |req: Request| async move {
            let id = req.get_param("id").unwrap_or_default().to_owned();
            Response::success("ok", &serde_json::json!({ "id": id }))
        });

    for (url, method) in router.loading_handlers(None, true) {
        println!("{:<8} {}", method.as_str(), url);
    }

    for path in ["/user/v1/list", "/users", "/user/7", "/user/v3/list"] {
        match router.handle(Request::new(Method::GET, path)).await {
            Ok(response) => println!("GET {path} -> {} {}", response.status, response.body),
            Err(err) => println!("GET {path} -> {}", Response::error(err).status),
        }
    }
}
