use std::{error::Error, sync::Arc, time::Duration};

use wrapp_named_di::{ArgError, Class, Container, Parameter, Producer};

fn main() -> Result<(), Box<dyn Error>> {
    let mut container = Container::new();
    container.literal("url", "postgres://localhost".to_string())?;
    container.literal("timeout", Duration::from_secs(5))?;

    container.register_all([
        (
            "pool",
            Producer::async_closure([Parameter::fields(["url", "timeout"])], |args| async move {
                let settings = args.group(0)?;
                Ok::<_, ArgError>(Pool {
                    url: settings.get_as("url")?,
                    timeout: *settings.get_as::<Duration>("timeout")?,
                })
            }),
        ),
        (
            "users",
            Class::new("UserService")
                .constructor(["pool"], |args| {
                    Ok::<_, ArgError>(UserService {
                        pool: args.get(0)?,
                    })
                })
                .into(),
        ),
    ])?;

    println!("{:?}", container);
    let users = futures::executor::block_on(container.get_as::<UserService>("users"))?;
    println!(
        "users on {} (timeout {:?})",
        users.pool.url, users.pool.timeout
    );
    println!("{:?}", container);

    Ok(())
}

#[derive(Debug)]
struct Pool {
    url: Arc<String>,
    timeout: Duration,
}

#[derive(Debug)]
struct UserService {
    pool: Arc<Pool>,
}
