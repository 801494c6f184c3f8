//! One schema shared by concurrent compilations

use std::sync::Arc;
use std::thread;

use graphcypher::config::CompilerConfig;
use graphcypher::query_planner::compile;
use graphcypher::query_planner::request::{Principal, QueryRequest};

use super::{library_schema, read_fixture};

#[test]
fn test_concurrent_compilations_share_schema() {
    let schema = Arc::new(library_schema());
    let config = Arc::new(CompilerConfig::default());
    let request: QueryRequest = read_fixture("requests/books_by_author.json");
    let expected = compile(&schema, &request, &Principal::anonymous(), &config)
        .unwrap()
        .cypher();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let schema = Arc::clone(&schema);
            let config = Arc::clone(&config);
            let request = request.clone();
            thread::spawn(move || {
                compile(&schema, &request, &Principal::anonymous(), &config)
                    .map(|program| program.cypher())
            })
        })
        .collect();

    for handle in handles {
        let cypher = handle.join().expect("compilation thread panicked").unwrap();
        assert_eq!(cypher, expected);
    }
}
