/*!
# bigquery

<b>A typed, async Rust client for running queries on Google BigQuery.</b>

This crate converts native Rust values into BigQuery query parameters,
submits queries over the REST API, and decodes the schema-described rows
that come back into typed [`Value`]s - losslessly, including INT64 values
beyond 2^53, NUMERIC/BIGNUMERIC decimals, nanosecond timestamps and RANGEs.

## ✨ Features

- ⚙️ **Connection strings** (`bigquery://host[:port]/project?location=..`) and environment configuration;
- 🪶 **Async execution** using `tokio` and `reqwest`;
- 🧩 **Parameterized queries**, positional or named, with type inference and explicit type hints;
- 🏎️ **Fast path** through `jobs.query`, falling back to a full job when needed;
- 🧾 **Typed rows** decoded from the result schema, page by page.

## Getting Started

```no_run
use bigquery::{ClientBuilder, QueryOptions};

# #[tokio::main]
# async fn main() -> Result<(), Box<dyn std::error::Error>> {
// 1️⃣ Configure a client
let client = ClientBuilder::new("my-project")?
    .location("US")
    .bearer_token("ya29...")
    .build()?;

// 2️⃣ Execute a query and receive decoded rows
let rows = client
    .query_builder("SELECT ? AS id, ? AS name")
    .bind(42)
    .bind("world")
    .execute()
    .await?;
println!("{:?}", rows[0].get("name"));

// 3️⃣ Or control pagination and decoding yourself
let results = client
    .query("SELECT word FROM `bigquery-public-data.samples.shakespeare`", QueryOptions {
        auto_paginate: false,
        max_results: Some(100),
        ..Default::default()
    })
    .await?;
println!("{} rows, next page: {:?}", results.rows.len(), results.page_token);
# Ok(())
# }
```

## 🧩 Parameters

Behind the scenes, [`SqlQueryBuilder::bind`](crate::query::SqlQueryBuilder::bind)
uses the [`ToValue`] trait, and the parameter type is inferred from the
value. Values whose type cannot be inferred (a `NULL`, an empty array) need
a [`TypeHint`]:

```
use bigquery::codec::{ParamTypes, QueryParams, build_query_params};
use bigquery::{TypeHint, Value};
use std::collections::HashMap;

let params = QueryParams::named([("ids", Value::Array(vec![]))]);
let types = ParamTypes::Named(HashMap::from([
    ("ids".to_string(), TypeHint::array("INT64")),
]));

let encoded = build_query_params(&params, Some(&types)).unwrap();
assert_eq!(encoded[0].parameter_type.r#type, "ARRAY");
```

## 🔢 Large integers

INT64 cells beyond 2^53 are refused by default rather than rounded. Decode
them losslessly with [`IntegerWrapping::Wrap`], or convert them with your own
[`IntegerTypeCast`] through [`IntegerWrapping::Cast`].

## 🧠 Concepts

- <b>[`BigQueryClient`]</b> — the entry point; owns the configuration and the transport.
- <b>[`Query`] / [`QueryOptions`]</b> — what to run, and how to fetch the results.
- <b>[`Job`]</b> — handle to a server-side job; polls and pages through its results.
- <b>[`Table`]</b> — streaming inserts and row reads.
- <b>[`Transport`](crate::transport::Transport)</b> — the REST seam, replaceable in tests.

## 🔒 Example Connection Strings

```text
bigquery://bigquery.googleapis.com/my-project
bigquery://bigquery.googleapis.com/my-project?location=EU&token=ya29...
bigquery://localhost:9050/test-project?tls=false&fast_path=false
```

## 📘 Learn More

- [BigQuery REST reference](https://cloud.google.com/bigquery/docs/reference/rest);
- [Running parameterized queries](https://cloud.google.com/bigquery/docs/parameterized-queries).

## Disclaimer:

This project is not affiliated with, endorsed by, or sponsored by Google LLC.
“Google” and “BigQuery” are trademarks of Google LLC.
*/

pub mod client;
pub mod codec;
pub mod decode;
mod error;
pub mod executor;
pub mod format;
pub mod job;
pub mod query;
pub mod schema;
pub mod table;
pub mod transport;
pub mod types;
pub mod value;
pub mod wire;

pub use client::{BigQueryClient, ClientBuilder, ClientConfig, JobCreationMode};
pub use codec::{ParamTypes, QueryParams};
pub use decode::{DecodeOptions, IntegerWrapping, Row};
pub use error::{BigQueryError, Result};
pub use format::{FormatOptions, TimestampOutputFormat};
pub use job::{Job, QueryResults};
pub use query::{Query, QueryOptions, QueryPriority};
pub use table::{GetRowsOptions, InsertFailure, InsertOptions, Table};
pub use types::{ScalarTag, TypeDescriptor, TypeHint};
pub use value::{
    BigQueryDate, BigQueryDatetime, BigQueryInt, BigQueryRange, BigQueryTime, BigQueryTimestamp,
    Geography, IntegerTypeCast, ToValue, Value,
};

#[cfg(test)]
mod test_utils;
