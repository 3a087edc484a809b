//! This example memoizes a toy halo model and shows how guarded model objects
//! interact with the cache. Run with `RUST_LOG=ccl_base=trace` to watch
//! stores being registered and entries being evicted.

use ccl_base::{Guarded, GuardedObject, ReprBuilder, Result, global, memoize, unlock};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let nfw = Guarded::new(Profile { concentration: 4.0, truncated: false });

    sigma(1e14, None, &nfw); // [Miss] The cache is empty.
    sigma(1e14, Some(0.0), &nfw); // [Hit] Same as the default redshift.
    sigma(1e14, Some(1.0), &nfw); // [Miss] Different redshift.

    // [Miss] An equal profile is a hit, but this one changed.
    retune(&nfw, 5.0)?;
    sigma(1e14, None, &nfw);

    // Only three results fit, the least frequently used one goes.
    for mass in [1e12, 1e13, 1e15] {
        sigma(mass, None, &nfw);
    }

    global().disable();
    sigma(1e14, None, &nfw); // [Miss] Caching is off.
    global().enable();

    for stats in global().stats() {
        println!("{stats}");
    }

    Ok(())
}

/// A density profile with a concentration parameter.
struct Profile {
    concentration: f64,
    truncated: bool,
}

impl GuardedObject for Profile {
    fn describe(&self) -> Option<String> {
        Some(
            ReprBuilder::new("Profile")
                .field("concentration", &self.concentration)
                .field("truncated", &self.truncated)
                .finish(),
        )
    }
}

/// Change the concentration of a profile.
#[unlock]
fn retune(profile: &Guarded<Profile>, concentration: f64) -> Result<()> {
    profile.assign(|profile| profile.concentration = concentration)
}

/// A made-up mass variance.
#[memoize(capacity = 3, policy = "lfu")]
fn sigma(mass: f64, #[default(0.0)] z: Option<f64>, profile: &Guarded<Profile>) -> f64 {
    let c = profile.read().concentration;
    (mass / 1e14).powf(-0.2) * c.sqrt() / (1.0 + z.unwrap_or_default())
}
