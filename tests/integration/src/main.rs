//! Integration Test Harness
//!
//! Runs every integration test binary and prints a summary.
//!
//! # Usage
//!
//! Run all tests:
//! ```text
//! cargo run -p integration-tests
//! ```
//!
//! Run one category:
//! ```text
//! cargo test -p integration-tests --test ndr_wire_tests
//! cargo test -p integration-tests --test dispatch_tests
//! cargo test -p integration-tests --test end_to_end_tests
//! cargo test -p integration-tests --test ref_counting_tests
//! cargo test -p integration-tests --test stress_tests
//! ```
//!
//! Run with increased logging:
//! ```text
//! RUST_LOG=debug cargo run -p integration-tests
//! ```

use std::process::{Command, ExitCode};
use std::time::{Duration, Instant};

use tracing::{error, info};

/// Test category
#[derive(Debug, Clone)]
struct TestCategory {
    name: &'static str,
    description: &'static str,
    test_name: &'static str,
}

const TEST_CATEGORIES: &[TestCategory] = &[
    TestCategory {
        name: "NDR Wire Tests",
        description: "Round trips, deferred ordering, truncation",
        test_name: "ndr_wire_tests",
    },
    TestCategory {
        name: "Dispatch Tests",
        description: "Interface inheritance and opnum routing",
        test_name: "dispatch_tests",
    },
    TestCategory {
        name: "End-to-End Tests",
        description: "Typed ORPC calls over duplex streams and TCP",
        test_name: "end_to_end_tests",
    },
    TestCategory {
        name: "Ref Counting Tests",
        description: "IRemUnknown and marshaled interface pointers",
        test_name: "ref_counting_tests",
    },
    TestCategory {
        name: "Stress Tests",
        description: "Concurrent clients and IPID table races",
        test_name: "stress_tests",
    },
];

struct CategoryResult {
    name: &'static str,
    success: bool,
    duration: Duration,
    summary: String,
}

fn run_test_category(category: &TestCategory) -> CategoryResult {
    info!(category = category.name, "running");
    let start = Instant::now();

    let output = Command::new("cargo")
        .args(["test", "-p", "integration-tests", "--test", category.test_name, "--", "--nocapture"])
        .output();

    let duration = start.elapsed();

    let (success, summary) = match output {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stdout.is_empty() {
                println!("{}", stdout);
            }
            if !stderr.is_empty() {
                eprintln!("{}", stderr);
            }

            if output.status.success() {
                (true, "PASSED".to_string())
            } else {
                (false, format!("FAILED (exit code: {:?})", output.status.code()))
            }
        }
        Err(e) => {
            error!(category = category.name, error = %e, "failed to execute cargo");
            (false, format!("Failed to execute: {}", e))
        }
    };

    CategoryResult {
        name: category.name,
        success,
        duration,
        summary,
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("Test Categories:");
    println!("{}", "-".repeat(80));
    for (i, cat) in TEST_CATEGORIES.iter().enumerate() {
        println!("  {}. {} - {}", i + 1, cat.name, cat.description);
    }
    println!("{}", "-".repeat(80));

    let total_start = Instant::now();
    let results: Vec<CategoryResult> = TEST_CATEGORIES.iter().map(run_test_category).collect();
    let total_duration = total_start.elapsed();

    let passed = results.iter().filter(|r| r.success).count();
    let failed = results.len() - passed;

    println!("\n{}", "=".repeat(80));
    println!("FINAL SUMMARY");
    println!("{}", "=".repeat(80));
    println!("\nCategories: {} | Passed: {} | Failed: {}", results.len(), passed, failed);
    println!("Total Duration: {:?}\n", total_duration);

    println!("{:<30} {:<10} {:<15} Details", "Category", "Status", "Duration");
    println!("{}", "-".repeat(80));
    for r in &results {
        let status = if r.success { "PASS" } else { "FAIL" };
        println!("{:<30} {:<10} {:<15?} {}", r.name, status, r.duration, r.summary);
    }
    println!("{}", "=".repeat(80));

    if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
