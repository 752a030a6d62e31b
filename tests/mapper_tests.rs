use std::path::Path;
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use sqlweave::prelude::*;

/// In-memory driver that records every statement it receives.
struct RecordingDriver {
    style: PlaceholderStyle,
    rows: RowSet,
    affected: u64,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
}

impl RecordingDriver {
    fn new(rows: RowSet, affected: u64) -> Arc<Self> {
        Arc::new(Self {
            style: PlaceholderStyle::Question,
            rows,
            affected,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, sql: &str, params: &[Value]) {
        self.calls.lock().unwrap().push((sql.to_string(), params.to_vec()));
    }
}

impl Driver for RecordingDriver {
    fn style(&self) -> PlaceholderStyle {
        self.style
    }

    fn fetch<'a>(&'a self, sql: &'a str, params: &'a [Value]) -> DriverFuture<'a, RowSet> {
        self.record(sql, params);
        let rows = self.rows.clone();
        Box::pin(async move { Ok(rows) })
    }

    fn execute<'a>(&'a self, sql: &'a str, params: &'a [Value]) -> DriverFuture<'a, u64> {
        self.record(sql, params);
        let affected = self.affected;
        Box::pin(async move { Ok(affected) })
    }
}

#[derive(Debug, PartialEq, Deserialize)]
struct User {
    id: i64,
    name: String,
}

sqlweave::record!(User);

#[derive(Serialize)]
struct NewUser {
    id: i64,
    name: String,
}

#[derive(Serialize)]
struct Batch {
    users: Vec<NewUser>,
}

sqlweave::mapper! {
    pub struct UserMapper {
        pub find: fn(Context) -> Result<Vec<User>, MapperError>,
        pub find_one: fn(Context) -> Result<User, MapperError>,
        pub count: fn(Context) -> anyhow::Result<i64>,
        pub insert_all: fn(Batch) -> Result<(), MapperError>,
        pub remove: fn(Context) -> Result<u64, MapperError>,
    }
}

sqlweave::mapper! {
    pub struct BrokenMapper {
        pub find: fn(Context) -> Result<i64, MapperError>,
        pub pair: fn(Context, Context) -> Result<i64, MapperError>,
    }
}

fn registry() -> Registry {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/mappers");
    Registry::load_dir(&dir, "xml", DuplicatePolicy::Override).unwrap()
}

fn users() -> RowSet {
    let mut set = RowSet::new(vec!["id".to_string(), "name".to_string()]);
    set.push(Context::new().with("id", 1).with("name", "ann"));
    set.push(Context::new().with("id", 2).with("name", "bob"));
    set
}

fn session(driver: Arc<RecordingDriver>) -> SqlWeave {
    SqlWeave::builder().registry(registry()).shared_driver(driver).build()
}

#[tokio::test]
async fn test_bound_select_marshals_records() {
    let driver = RecordingDriver::new(users(), 0);
    let weave = session(driver.clone());
    let mut mapper = UserMapper::default();
    weave.bind(&mut mapper).unwrap();
    assert_eq!(mapper.find.statement().as_deref(), Some("UserMapper.find"));

    let found = mapper.find.call(Context::new().with("ids", vec![1, 2])).await.unwrap();
    assert_eq!(
        found,
        vec![
            User { id: 1, name: "ann".to_string() },
            User { id: 2, name: "bob".to_string() },
        ]
    );
    assert_eq!(
        driver.calls(),
        vec![(
            "SELECT * FROM users WHERE 1 = 1 AND id IN (?,?) ORDER BY id".to_string(),
            vec![Value::Int(1), Value::Int(2)],
        )]
    );
}

#[tokio::test]
async fn test_scalar_and_custom_error_type() {
    let mut counts = RowSet::new(vec!["COUNT(*)".to_string()]);
    counts.push(Context::new().with("COUNT(*)", 2));
    let weave = session(RecordingDriver::new(counts, 0));
    let mut mapper = UserMapper::default();
    weave.bind(&mut mapper).unwrap();

    let count = mapper.count.call(Context::new()).await.unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn test_insert_from_struct_input() {
    let driver = RecordingDriver::new(RowSet::default(), 2);
    let weave = session(driver.clone());
    let mut mapper = UserMapper::default();
    weave.bind(&mut mapper).unwrap();

    let batch = Batch {
        users: vec![
            NewUser { id: 1, name: "ann".to_string() },
            NewUser { id: 2, name: "bob".to_string() },
        ],
    };
    mapper.insert_all.call(batch).await.unwrap();

    let calls = driver.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "INSERT INTO users (id, name) VALUES (?, ?), (?, ?)");
    assert_eq!(
        calls[0].1,
        vec![Value::Int(1), Value::from("ann"), Value::Int(2), Value::from("bob")]
    );
}

#[tokio::test]
async fn test_delete_returns_affected_rows() {
    let driver = RecordingDriver::new(RowSet::default(), 1);
    let weave = session(driver.clone());
    let mut mapper = UserMapper::default();
    weave.bind(&mut mapper).unwrap();

    let removed = mapper.remove.call(Context::new().with("id", 9)).await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(driver.calls()[0].0, "DELETE FROM users WHERE id = ?");
}

#[tokio::test]
async fn test_single_row_without_rows() {
    let weave = session(RecordingDriver::new(RowSet::default(), 0));
    let mut mapper = UserMapper::default();
    weave.bind(&mut mapper).unwrap();

    let err = mapper.find_one.call(Context::new().with("id", 3)).await.unwrap_err();
    assert!(matches!(err.root(), MapperError::NoRows));
    assert_eq!(err.to_string(), "select 'UserMapper.find_one': Query returned no rows");
}

#[tokio::test]
async fn test_render_failure_reaches_caller() {
    let driver = RecordingDriver::new(users(), 0);
    let weave = session(driver.clone());
    let mut mapper = UserMapper::default();
    weave.bind(&mut mapper).unwrap();

    let err = mapper.find_one.call(Context::new()).await.unwrap_err();
    assert!(matches!(err, MapperError::Statement { tag: "select", .. }));
    assert!(matches!(err.root(), MapperError::Lookup(_)));
    assert!(driver.calls().is_empty());
}

#[test]
fn test_two_input_function_fails_binding() {
    let weave = SqlWeave::new(registry());
    let mut mapper = BrokenMapper::default();
    let err = weave.bind(&mut mapper).unwrap_err();
    assert!(matches!(err, MapperError::Binding(_)));
    assert_eq!(
        err.to_string(),
        "Binding error: BrokenMapper.pair: there can only be one argument"
    );
    assert!(!mapper.find.is_bound());
}

#[tokio::test]
async fn test_unbound_call() {
    let mapper = UserMapper::default();
    let err = mapper.remove.call(Context::new().with("id", 1)).await.unwrap_err();
    assert!(matches!(err, MapperError::Binding(_)));
}

#[tokio::test]
async fn test_driver_style_sets_markers() {
    let driver = Arc::new(RecordingDriver {
        style: PlaceholderStyle::Dollar,
        rows: RowSet::default(),
        affected: 2,
        calls: Mutex::new(Vec::new()),
    });
    let weave = session(driver.clone());
    assert_eq!(weave.style(), PlaceholderStyle::Dollar);

    let ctx = Context::new()
        .with("shipped", true)
        .with("ids", Arc::new(Value::from(vec![3, 4])));
    let affected = weave.execute("OrderMapper.mark_shipped", &ctx).await.unwrap();
    assert_eq!(affected, 2);
    assert_eq!(
        driver.calls()[0].0,
        "UPDATE orders SET shipped = $1 WHERE id IN ($2,$3)"
    );
}

#[tokio::test]
async fn test_fetch_by_statement_id() {
    let weave = session(RecordingDriver::new(users(), 0));
    let first: Option<Row> = weave
        .fetch("UserMapper.find", &Context::new().with("name", "ann"))
        .await
        .unwrap();
    let first = first.unwrap();
    assert_eq!(first.get("name"), Some(&Value::from("ann")));
}

mod shapes {
    use super::*;
    use pretty_assertions::assert_eq;

    sqlweave::mapper! {
        pub struct UserMapper {
            pub find: fn(Context) -> Result<Option<User>, MapperError>,
            pub find_one: fn(Context) -> Result<Row, MapperError>,
            pub count: fn(Context) -> Result<String, MapperError>,
            pub remove: fn(Context) -> Result<Vec<Row>, MapperError>,
        }
    }

    #[tokio::test]
    async fn test_every_bound_shape_is_callable() {
        let weave = session(RecordingDriver::new(users(), 3));
        let mut mapper = UserMapper::default();
        weave.bind(&mut mapper).unwrap();

        let first = mapper.find.call(Context::new()).await.unwrap();
        assert_eq!(first, Some(User { id: 1, name: "ann".to_string() }));

        let row = mapper.find_one.call(Context::new().with("id", 1)).await.unwrap();
        assert_eq!(row.get("name"), Some(&Value::from("ann")));

        let count = mapper.count.call(Context::new()).await.unwrap();
        assert_eq!(count, "1");

        let affected = mapper.remove.call(Context::new().with("id", 1)).await.unwrap();
        assert_eq!(affected.len(), 1);
        assert_eq!(affected[0].get("rows_affected"), Some(&Value::Int(3)));
    }

    #[tokio::test]
    async fn test_optional_shape_without_rows() {
        let weave = session(RecordingDriver::new(RowSet::default(), 0));
        let mut mapper = UserMapper::default();
        weave.bind(&mut mapper).unwrap();
        assert_eq!(mapper.find.call(Context::new()).await.unwrap(), None);
    }
}
