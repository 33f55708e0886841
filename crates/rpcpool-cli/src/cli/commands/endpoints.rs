//! `rpcpool endpoints` – print the parsed endpoint table.

use anyhow::Result;
use rpcpool_core::EndpointResolver;

pub fn run_endpoints(spec: &str) -> Result<()> {
    let resolver = EndpointResolver::from_spec(spec)?;
    let endpoints = resolver.snapshot();
    println!("{:<6} {:<30} {}", "INDEX", "HOST", "PORT");
    for (i, ep) in endpoints.iter().enumerate() {
        println!("{:<6} {:<30} {}", i, ep.host, ep.port);
    }
    println!(
        "{} endpoint(s); selector n maps to index |n| mod {}",
        endpoints.len(),
        endpoints.len()
    );
    Ok(())
}
