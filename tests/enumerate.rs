//! End-to-end enumeration against the demo SQLite catalog
//!
//! Every test runs a request through the full pipeline: urn parsing, level
//! resolution, statement chaining across levels and execution.

#![cfg(feature = "sqlite")]

use pretty_assertions::assert_eq;
use serde_json::json;

use urnquery::engine::sqlite::SqliteContext;
use urnquery::enumerator::OrderBy;
use urnquery::{
    DataTable, EnumData, Enumerator, PropertiesRequest, Request, RequestFieldsKind, ResultType,
    ServerInformation, ServerVersion,
};

fn demo() -> SqliteContext {
    SqliteContext::demo().expect("demo catalog loads")
}

fn table(enumerator: &Enumerator, request: &Request) -> DataTable {
    table_on(enumerator, request, &demo())
}

fn table_on(enumerator: &Enumerator, request: &Request, ctx: &SqliteContext) -> DataTable {
    enumerator
        .get_data(request, ctx)
        .unwrap()
        .into_table()
        .unwrap()
}

fn column(table: &DataTable, name: &str) -> Vec<serde_json::Value> {
    table.column_values(name).into_iter().cloned().collect()
}

// ============================================================================
// Hierarchy Traversal
// ============================================================================

#[test]
fn test_tables_of_one_database() {
    let request = Request::new("Server/Database[@Name='Foo']/Table")
        .with_fields(&["Name", "Schema"])
        .with_order_by(vec![OrderBy::asc("Name")]);
    let result = table(&Enumerator::new(), &request);

    insta::assert_json_snapshot!(result.to_records(), @r#"
    [
      {
        "Name": "Customers",
        "Schema": "dbo"
      },
      {
        "Name": "Invoices",
        "Schema": "sales"
      },
      {
        "Name": "Orders",
        "Schema": "dbo"
      },
      {
        "Name": "sysobjects",
        "Schema": "sys"
      }
    ]
    "#);
}

#[test]
fn test_columns_four_levels_deep() {
    let request =
        Request::new("Server/Database[@Name='Foo']/Table[@Name='Orders' and @Schema='dbo']/Column")
            .with_fields(&["Name", "DataType"])
            .with_order_by(vec![OrderBy::asc("ID")]);
    let result = table(&Enumerator::new(), &request);

    assert_eq!(result.columns, vec!["Name", "DataType"]);
    assert_eq!(
        column(&result, "Name"),
        vec![
            json!("id"),
            json!("customer_id"),
            json!("total"),
            json!("placed_at")
        ]
    );
    assert_eq!(
        column(&result, "DataType"),
        vec![
            json!("int"),
            json!("int"),
            json!("decimal"),
            json!("datetime2")
        ]
    );
}

#[test]
fn test_urn_property_built_from_parents() {
    let request =
        Request::new("Server/Database[@Name='Foo']/Table[@Name='Orders']").with_fields(&["Urn"]);
    let result = table(&Enumerator::new(), &request);
    assert_eq!(
        column(&result, "Urn"),
        vec![json!(
            "Server[@Name='demo']/Database[@Name='Foo']/Table[@Name='Orders' and @Schema='dbo']"
        )]
    );
}

#[test]
fn test_property_computed_from_parent() {
    let request = Request::new("Server/Database[@Name='Foo']/Table[@Name='Invoices']")
        .with_fields(&["Name", "DatabaseName"]);
    let result = table(&Enumerator::new(), &request);
    assert_eq!(result.rows, vec![vec![json!("Invoices"), json!("Foo")]]);
}

#[test]
fn test_parent_properties_join_the_result() {
    let request = Request::new("Server/Database/Table[@Schema='dbo']")
        .with_fields(&["Name"])
        .with_order_by(vec![OrderBy::asc("Name")])
        .with_parent_properties(vec![Some(PropertiesRequest::fields(&["Name"]))]);
    let result = table(&Enumerator::new(), &request);

    assert_eq!(result.columns, vec!["Name", "Database_Name"]);
    insta::assert_json_snapshot!(result.rows, @r#"
    [
      [
        "Customers",
        "Foo"
      ],
      [
        "Notes_2024",
        "O'Brien"
      ],
      [
        "Orders",
        "Foo"
      ],
      [
        "spt_values",
        "master"
      ]
    ]
    "#);
}

// ============================================================================
// Filters
// ============================================================================

#[test]
fn test_filter_functions() {
    let request = Request::new(
        "Server/Database[@Name='Foo']/Table[@IsSystemObject=false() and contains(@Name, 'o')]",
    )
    .with_fields(&["Name"])
    .with_order_by(vec![OrderBy::asc("Name")]);
    let result = table(&Enumerator::new(), &request);
    assert_eq!(
        column(&result, "Name"),
        vec![json!("Customers"), json!("Invoices"), json!("Orders")]
    );
}

#[test]
fn test_quote_in_filter_constant() {
    let request =
        Request::new(r#"Server/Database[@Name="O'Brien"]"#).with_fields(&["Name", "Urn"]);
    let result = table(&Enumerator::new(), &request);
    assert_eq!(
        result.rows,
        vec![vec![
            json!("O'Brien"),
            json!("Server[@Name='demo']/Database[@Name='O''Brien']")
        ]]
    );
}

#[test]
fn test_parameterized_filter() {
    let ctx = demo().with_parameterization(true);
    let request =
        Request::new("Server/Database[@Name='Foo']/Table[@Schema='sales']").with_fields(&["Name"]);
    let result = table_on(&Enumerator::new(), &request, &ctx);
    assert_eq!(result.rows, vec![vec![json!("Invoices")]]);
}

#[test]
fn test_parameterized_constant_is_not_sql() {
    let ctx = demo().with_parameterization(true);
    let request =
        Request::new("Server/Login[@Name='x</msparam> OR 1=1 --']").with_fields(&["Name"]);
    let result = table_on(&Enumerator::new(), &request, &ctx);
    assert!(result.is_empty());
}

// ============================================================================
// Property Lists
// ============================================================================

#[test]
fn test_rejected_fields() {
    let request = Request::new("Server/Database[@Name='Foo']")
        .with_fields(&["Urn", "CreateDate"])
        .with_fields_kind(RequestFieldsKind::REJECT);
    let result = table(&Enumerator::new(), &request);
    assert_eq!(
        result.columns,
        vec![
            "Name",
            "ID",
            "CompatibilityLevel",
            "ReadOnly",
            "IsSystemObject",
            "IsLedger"
        ]
    );
    assert_eq!(
        result.rows,
        vec![vec![
            json!("Foo"),
            json!(2),
            json!(160),
            json!(0),
            json!(0),
            json!(0)
        ]]
    );
}

#[test]
fn test_version_hides_newer_properties() {
    let server = ServerInformation {
        version: ServerVersion::new(15, 0, 2000),
        ..Default::default()
    };
    let ctx = demo().with_server_information(server);
    let request = Request::new("Server/Database[@Name='Foo']")
        .with_fields(&["Urn", "CreateDate"])
        .with_fields_kind(RequestFieldsKind::REJECT);
    let result = table_on(&Enumerator::new(), &request, &ctx);
    assert!(!result.columns.iter().any(|c| c == "IsLedger"));

    let ledger = Request::new("Server/Database").with_fields(&["IsLedger"]);
    let err = Enumerator::new().get_data(&ledger, &ctx).unwrap_err();
    assert_eq!(err.error_code(), "UNKNOWN_PROPERTY");
}

#[test]
fn test_expensive_properties_on_request() {
    let request = Request::new("Server/Login[@Name='sa']")
        .with_fields_kind(RequestFieldsKind::REQUEST | RequestFieldsKind::INCLUDE_EXPENSIVE);
    let result = table(&Enumerator::new(), &request);
    assert_eq!(result.columns.last().map(String::as_str), Some("Sid"));
    assert_eq!(result.value(0, "Sid"), Some(&json!("AQ==")));
    assert_eq!(
        result.value(0, "Urn"),
        Some(&json!("Server[@Name='demo']/Login[@Name='sa']"))
    );
}

// ============================================================================
// Result Types
// ============================================================================

#[test]
fn test_result_types() {
    let enumerator = Enumerator::new();
    let base = Request::new("Server/Login")
        .with_fields(&["Name"])
        .with_order_by(vec![OrderBy::desc("Name")]);

    let set = enumerator
        .get_data(&base.clone().with_result_type(ResultType::DataSet), &demo())
        .unwrap();
    assert_eq!(set.result_type, ResultType::DataSet);
    assert!(matches!(
        &set.data,
        EnumData::DataSet(tables) if tables.len() == 1 && tables[0].len() == 3
    ));

    let reader = enumerator
        .get_data(&base.clone().with_result_type(ResultType::DataReader), &demo())
        .unwrap();
    let EnumData::Reader(reader) = reader.data else {
        panic!("expected a reader");
    };
    assert_eq!(reader.columns().to_vec(), vec!["Name".to_string()]);
    let names: Vec<_> = reader.map(|row| row[0].clone()).collect();
    assert_eq!(
        names,
        vec![json!("sa"), json!("app_user"), json!("DOMAIN\\ops")]
    );

    let err = enumerator
        .get_data(&base.with_result_type(ResultType::XmlDocument), &demo())
        .unwrap_err();
    assert_eq!(err.error_code(), "RESULT_NOT_SUPPORTED");
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_unresolved_urn() {
    let err = Enumerator::new()
        .get_data(&Request::new("Server/Mailbox"), &demo())
        .unwrap_err();
    assert_eq!(err.error_code(), "UNRESOLVED_URN");
    assert_eq!(err.message(), "Urn could not be resolved at level Mailbox");
}

#[test]
fn test_missing_catalog_returns_empty_result() {
    let ctx = SqliteContext::in_memory()
        .unwrap()
        .with_server_information(ServerInformation::default());
    let request = Request::new("Server/Login").with_fields(&["Name", "ID"]);
    let result = table_on(&Enumerator::new(), &request, &ctx);
    assert_eq!(result.columns, vec!["Name", "ID"]);
    assert!(result.is_empty());
}

#[test]
fn test_levels_are_reused_between_requests() {
    let enumerator = Enumerator::new();
    let request = Request::new("Server/Database[@Name='Foo']").with_fields(&["Name"]);
    table(&enumerator, &request);
    assert_eq!(enumerator.cache().len(), 2);

    table(&enumerator, &request);
    assert_eq!(enumerator.cache().len(), 2);

    let tables = Request::new("Server/Database[@Name='master']/Table").with_fields(&["Name"]);
    table(&enumerator, &tables);
    assert_eq!(enumerator.cache().len(), 3);
}
