use clap::{Parser, Subcommand};
use log::{error, info};
use user_credentials::{
    store, verify_password, Config, Error, NewUser, PasswordHasher, Result, User, UserStore,
    UserUpdate,
};
use validator::Validate;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Manage stored user credentials")]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Hash a password with the configured work factor and print it.
    Hash { password: String },
    /// Check a password against a stored hash.
    Verify { hash: String, password: String },
    /// Create a user.
    Create {
        #[clap(long)]
        username: String,
        #[clap(long)]
        email: String,
        #[clap(long)]
        password: String,
    },
    /// Change some fields of a user. A new password is hashed before it is stored.
    Update {
        id: i32,
        #[clap(long)]
        username: Option<String>,
        #[clap(long)]
        email: Option<String>,
        #[clap(long)]
        password: Option<String>,
    },
    /// Delete a user.
    Delete { id: i32 },
    /// Check an email and password pair.
    Login {
        #[clap(long)]
        email: String,
        #[clap(long)]
        password: String,
    },
}

fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "user_credentials=info");
    }
    env_logger::init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

/// `Ok(false)` means the command ran but the answer was "no".
fn run(command: Command) -> Result<bool> {
    let config = Config::from_env()?;
    let hasher = PasswordHasher::new(config.hash)?;
    let open_store = |hasher: PasswordHasher| -> Result<UserStore> {
        let database = config.database()?;
        info!("Connecting to database...");
        Ok(UserStore::new(store::connect(database)?, hasher))
    };

    match command {
        Command::Hash { password } => {
            UserUpdate::password(password.as_str()).validate()?;
            println!("{}", hasher.hash_password(&password)?);
            Ok(true)
        }
        Command::Verify { hash, password } => {
            let matched = verify_password(&password, &hash)?;
            println!("{}", if matched { "match" } else { "mismatch" });
            Ok(matched)
        }
        Command::Create {
            username,
            email,
            password,
        } => {
            let users = open_store(hasher)?;
            let user = users.create(NewUser::new(username, email, password))?;
            print_user(&user)?;
            Ok(true)
        }
        Command::Update {
            id,
            username,
            email,
            password,
        } => {
            let users = open_store(hasher)?;
            let update = UserUpdate {
                username,
                email,
                password,
            };
            print_user(&users.update(id, update)?)?;
            Ok(true)
        }
        Command::Delete { id } => {
            let deleted = open_store(hasher)?.delete(id)?;
            if !deleted {
                println!("no user with id {}", id);
            }
            Ok(deleted)
        }
        Command::Login { email, password } => {
            match open_store(hasher)?.authenticate(&email, &password)? {
                Some(user) => {
                    print_user(&user)?;
                    Ok(true)
                }
                None => {
                    println!("invalid credentials");
                    Ok(false)
                }
            }
        }
    }
}

fn print_user(user: &User) -> Result<()> {
    let json = serde_json::to_string_pretty(user)
        .map_err(|e| Error::Io(e.into()))?;
    println!("{}", json);
    Ok(())
}
