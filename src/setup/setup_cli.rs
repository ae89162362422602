use blogicum_backend::config::Config;
use blogicum_backend::helper::form_helpers::{is_valid_slug, is_valid_username, password_errors};
use blogicum_backend::models::db_operations::users_db_operations::{self, NewUser};
use blogicum_backend::models::db_operations::taxonomy_db_operations;
use blogicum_backend::setup::db_setup;
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "setup_cli", author, version, about = "A CLI for initial Blogicum setup.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    /// Manage staff accounts that can reach the admin area.
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    Category {
        #[command(subcommand)]
        action: CategoryAction,
    },
    Location {
        #[command(subcommand)]
        action: LocationAction,
    },
}

#[derive(Subcommand, Debug)]
enum DbAction {
    Setup,
}

#[derive(Subcommand, Debug)]
enum AdminAction {
    Create {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "")]
        email: String,
    },
    List,
    ChangePassword {
        #[arg(long)]
        username: String,
        #[arg(long)]
        new_password: String,
    },
    ChangeUsername {
        #[arg(long)]
        old_username: String,
        #[arg(long)]
        new_username: String,
    },
}

#[derive(Subcommand, Debug)]
enum CategoryAction {
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        slug: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Create the category hidden from public listings.
        #[arg(long)]
        unpublished: bool,
    },
}

#[derive(Subcommand, Debug)]
enum LocationAction {
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        unpublished: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file).expect("FATAL: Failed to load or parse configuration.");

    match &cli.command {
        Commands::Db { action } => match action {
            DbAction::Setup => setup_blog_database(&config),
        },
        Commands::Admin { action } => match action {
            AdminAction::Create { username, password, email } => create_admin_user(&config, username, password, email),
            AdminAction::List => list_admin_users(&config),
            AdminAction::ChangePassword { username, new_password } => {
                change_admin_password(&config, username, new_password)
            }
            AdminAction::ChangeUsername { old_username, new_username } => {
                change_admin_username(&config, old_username, new_username)
            }
        },
        Commands::Category { action } => match action {
            CategoryAction::Create { title, slug, description, unpublished } => {
                create_category(&config, title, slug, description, !unpublished)
            }
        },
        Commands::Location { action } => match action {
            LocationAction::Create { name, unpublished } => create_location(&config, name, !unpublished),
        },
    }
}

fn setup_blog_database(config: &Config) {
    let db_path = config.blog_db_path();
    println!("\nSetting up blog database at '{}'...", db_path.display());

    if let Some(parent_dir) = db_path.parent() {
        fs::create_dir_all(parent_dir).expect("Could not create database directory.");
    }

    let mut conn = Connection::open(&db_path).expect("Could not create blog database file.");
    match db_setup::setup_blog_db(&mut conn) {
        Ok(_) => println!("✅ Blog database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up blog database: {}", e),
    }
}

fn open_existing_db(config: &Config) -> Option<Connection> {
    let db_path = config.blog_db_path();
    if !db_path.exists() {
        eprintln!(
            "❌ Error: Blog database not found at '{}'. Please run `setup_cli db setup` first.",
            db_path.display()
        );
        return None;
    }
    match Connection::open(&db_path) {
        Ok(conn) => match conn.execute_batch(db_setup::CONNECTION_PRAGMAS) {
            Ok(_) => Some(conn),
            Err(e) => {
                eprintln!("❌ Error configuring database connection: {}", e);
                None
            }
        },
        Err(e) => {
            eprintln!("❌ Error opening blog database: {}", e);
            None
        }
    }
}

fn create_admin_user(config: &Config, username: &str, password: &str, email: &str) {
    if !is_valid_username(username) {
        eprintln!("❌ Error: '{}' is not a valid username. Use letters, numbers and @/./+/-/_ only.", username);
        return;
    }
    let problems = password_errors(password, password);
    if !problems.is_empty() {
        eprintln!("❌ Error: Password rejected: {}", serde_json::to_string(&problems).unwrap_or_default());
        return;
    }
    let Some(mut conn) = open_existing_db(config) else {
        return;
    };

    let new_user = NewUser { username, email, is_staff: true, ..NewUser::default() };
    match users_db_operations::create_user(&mut conn, &new_user, password) {
        Ok(_) => println!("✅ Admin user '{}' created successfully.", username),
        Err(e) => eprintln!("❌ Error creating admin user: {}. It might be because the username already exists.", e),
    }
}

fn list_admin_users(config: &Config) {
    let Some(conn) = open_existing_db(config) else {
        return;
    };
    println!("Listing Admin Users:");
    match users_db_operations::read_staff_users(&conn) {
        Ok(users) => {
            for user in users {
                let status = if user.is_active { "" } else { " (inactive)" };
                println!("- {}{}", user.username, status);
            }
        }
        Err(e) => eprintln!("❌ Error fetching admins: {}", e),
    }
}

fn change_admin_password(config: &Config, username: &str, new_password: &str) {
    let problems = password_errors(new_password, new_password);
    if !problems.is_empty() {
        eprintln!("❌ Error: Password rejected: {}", serde_json::to_string(&problems).unwrap_or_default());
        return;
    }
    let Some(conn) = open_existing_db(config) else {
        return;
    };
    match users_db_operations::read_user_by_username(&conn, username) {
        Ok(Some(user)) if user.is_staff => {}
        Ok(_) => {
            eprintln!("❌ Error: No admin user named '{}' found.", username);
            return;
        }
        Err(e) => {
            eprintln!("❌ Error looking up user: {}", e);
            return;
        }
    }
    match users_db_operations::set_password(&conn, username, new_password) {
        Ok(0) => eprintln!("❌ Error: No admin user named '{}' found.", username),
        Ok(_) => println!("✅ Password for admin user '{}' changed successfully.", username),
        Err(e) => eprintln!("❌ Error updating password: {}", e),
    }
}

fn change_admin_username(config: &Config, old_username: &str, new_username: &str) {
    if !is_valid_username(new_username) {
        eprintln!("❌ Error: '{}' is not a valid username.", new_username);
        return;
    }
    let Some(conn) = open_existing_db(config) else {
        return;
    };
    match users_db_operations::rename_staff_user(&conn, old_username, new_username) {
        Ok(0) => eprintln!("❌ Error: No admin user named '{}' found.", old_username),
        Ok(_) => println!("✅ Admin username changed from '{}' to '{}'.", old_username, new_username),
        Err(e) => eprintln!("❌ Error changing username: {}. The new username might already be taken.", e),
    }
}

fn create_category(config: &Config, title: &str, slug: &str, description: &str, is_published: bool) {
    if !is_valid_slug(slug) {
        eprintln!("❌ Error: '{}' is not a valid slug. Use Latin letters, numbers, underscores or hyphens.", slug);
        return;
    }
    let Some(conn) = open_existing_db(config) else {
        return;
    };
    match taxonomy_db_operations::create_category(&conn, title, description, slug, is_published) {
        Ok(id) => println!("✅ Category '{}' created with id {}.", slug, id),
        Err(e) => eprintln!("❌ Error creating category: {}. The slug might already be taken.", e),
    }
}

fn create_location(config: &Config, name: &str, is_published: bool) {
    let Some(conn) = open_existing_db(config) else {
        return;
    };
    match taxonomy_db_operations::create_location(&conn, name, is_published) {
        Ok(id) => println!("✅ Location '{}' created with id {}.", name, id),
        Err(e) => eprintln!("❌ Error creating location: {}. The name might already be taken.", e),
    }
}
