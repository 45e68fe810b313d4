use std::{
    io::{self, BufRead},
    path::PathBuf,
    sync::{Arc, mpsc},
    thread,
};

use clap::{Args as ClapArgs, Parser, Subcommand};
use log::{error, info, warn};
use samu_dispatch::{
    AppConfig, CancelReason, CompassPoint, DispatchController, DispatchError, DispatchEvent,
    EmergencyKind, FileBasedStore, FixedPosition, GeoPoint, OpenRouteServiceProvider,
    PositionSource, ProfileStore, RouteProvider, StaticRouteProvider, UserSession,
    route_length,
    store::{AccountUpdate, BloodType, UserAccount},
    writer,
};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use uom::si::length::meter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(ClapArgs, Debug)]
struct Credentials {
    #[arg(long)]
    email: String,

    #[arg(long)]
    password: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Place an emergency call and follow the unit until the incident closes
    Dispatch {
        /// Triage label, one of the presets or free text
        #[arg(short, long, default_value = EmergencyKind::DEFAULT_LABEL)]
        kind: String,

        /// Patient latitude. Leaving the location out behaves like a denied permission
        #[arg(long, requires = "lng", allow_negative_numbers = true)]
        lat: Option<f64>,

        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lng: Option<f64>,

        /// Skip the directions service and drive in a straight line
        #[arg(long)]
        offline: bool,

        /// Confirm arrival and close the incident without waiting for input
        #[arg(long)]
        auto: bool,

        /// Write every dispatch event to this file as JSON lines
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Log in to check the medical record before calling
        #[arg(long, requires = "password")]
        email: Option<String>,

        #[arg(long, requires = "email")]
        password: Option<String>,
    },
    /// List the triage presets
    Triage,
    /// Create an account
    Register {
        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,

        #[arg(long)]
        name: String,
    },
    /// Show or edit the medical profile
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// Manage emergency contacts
    Contacts {
        #[command(subcommand)]
        action: ContactsAction,
    },
}

#[derive(Subcommand, Debug)]
enum ProfileAction {
    Show {
        #[command(flatten)]
        credentials: Credentials,
    },
    Update {
        #[command(flatten)]
        credentials: Credentials,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        new_email: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        new_password: Option<String>,

        /// A+, A-, B+, B-, AB+, AB-, O+, O- or Unknown
        #[arg(long)]
        blood_type: Option<String>,

        #[arg(long)]
        age: Option<String>,

        #[arg(long)]
        weight: Option<String>,

        #[arg(long)]
        height: Option<String>,

        #[arg(long)]
        allergies: Option<String>,

        #[arg(long)]
        medications: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ContactsAction {
    List {
        #[command(flatten)]
        credentials: Credentials,
    },
    Add {
        #[command(flatten)]
        credentials: Credentials,

        #[arg(long)]
        name: String,

        #[arg(long)]
        phone: String,
    },
    Delete {
        #[command(flatten)]
        credentials: Credentials,

        #[arg(long)]
        id: u64,
    },
}

/// What the user can type while a call is running.
#[derive(Debug, PartialEq)]
enum UserCommand {
    Cancel(CancelReason),
    Confirm,
    Finish,
    Status,
    Quit,
}

impl UserCommand {
    fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let command = match (words.next()?, words.next()) {
            ("cancel", Some("false-alarm")) => UserCommand::Cancel(CancelReason::FalseAlarm),
            ("cancel", Some("resolved")) => UserCommand::Cancel(CancelReason::Resolved),
            ("confirm", None) => UserCommand::Confirm,
            ("finish", None) => UserCommand::Finish,
            ("status", None) => UserCommand::Status,
            ("quit", None) | ("exit", None) => UserCommand::Quit,
            _ => return None,
        };
        Some(command)
    }
}

fn open_store(config: &AppConfig) -> Result<FileBasedStore, DispatchError> {
    FileBasedStore::open(&config.data_dir()?)
}

fn login(store: &FileBasedStore, credentials: &Credentials) -> Result<UserSession, DispatchError> {
    store.login(&credentials.email, &credentials.password)
}

fn print_account(account: &UserAccount) {
    let profile = &account.profile;
    let show = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
    println!("{} <{}>", account.name, account.email);
    println!("  phone:       {}", show(&account.phone));
    println!(
        "  blood type:  {}",
        profile
            .blood_type
            .map(|b| b.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("  age:         {}", show(&profile.age));
    println!("  weight:      {}", show(&profile.weight));
    println!("  height:      {}", show(&profile.height));
    println!("  allergies:   {}", show(&profile.allergies));
    println!("  medications: {}", show(&profile.medications));
    if profile.is_incomplete() {
        println!("Incomplete medical record: add your blood type and allergies.");
    }
}

fn render(event: &DispatchEvent) {
    match event {
        DispatchEvent::StatusChanged { title, text, .. } => println!("[{}] {}", title, text),
        DispatchEvent::RouteReady {
            points, fallback, ..
        } => println!(
            "Route with {} waypoints, {:.0} m{}",
            points.len(),
            route_length(points).get::<meter>(),
            if *fallback { " (straight line)" } else { "" }
        ),
        DispatchEvent::VehicleMoved {
            position, heading, ..
        } => println!(
            "  unit at {} heading {:.0}° {}",
            position,
            heading,
            CompassPoint::from_heading(*heading)
        ),
        DispatchEvent::Arrived { .. } => {
            println!("Type 'confirm' once the team is with you.")
        }
        DispatchEvent::Cancelled { reason, .. } => {
            println!("Call cancelled: {}", reason.description())
        }
        DispatchEvent::Reset { .. } => {}
        DispatchEvent::LocationUnavailable { reason } => {
            println!("Location unavailable: {}", reason)
        }
    }
}

fn read_commands(commands: UnboundedSender<UserCommand>) {
    for line in io::stdin().lock().lines() {
        let Ok(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        match UserCommand::parse(&line) {
            Some(command) => {
                if commands.send(command).is_err() {
                    break;
                }
            }
            None => println!(
                "Commands: cancel false-alarm | cancel resolved | confirm | finish | status | quit"
            ),
        }
    }
}

fn handle(controller: &DispatchController, command: UserCommand) -> bool {
    let result = match command {
        UserCommand::Cancel(reason) => controller.cancel(reason),
        UserCommand::Confirm => controller.confirm_arrival(),
        UserCommand::Finish => controller.finish(),
        UserCommand::Status => {
            let snapshot = controller.snapshot();
            println!(
                "[{}] {} (vehicle at {})",
                snapshot.title, snapshot.status, snapshot.vehicle_position
            );
            if let Some(destination) = snapshot.destination {
                println!(
                    "  {:.0} m to go, {} -> {}",
                    snapshot.vehicle_position.distance_to(&destination),
                    snapshot.origin,
                    destination
                );
            }
            Ok(())
        }
        UserCommand::Quit => return true,
    };
    if let Err(e) = result {
        println!("{}", e);
    }
    false
}

/// Forward `event` to the JSON-lines writer, if one is running. False when it has stopped.
fn record(event_log: Option<&mpsc::Sender<DispatchEvent>>, event: &DispatchEvent) -> bool {
    let Some(event_log) = event_log else {
        return true;
    };
    if event_log.send(event.clone()).is_err() {
        warn!("Event log writer stopped, dropping {:?}", event);
        return false;
    }
    true
}

async fn follow_call(
    controller: &DispatchController,
    mut events: UnboundedReceiver<DispatchEvent>,
    mut commands: UnboundedReceiver<UserCommand>,
    event_log: Option<mpsc::Sender<DispatchEvent>>,
    auto: bool,
) {
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    return;
                };
                render(&event);
                record(event_log.as_ref(), &event);
                match event {
                    DispatchEvent::Arrived { .. } if auto => {
                        handle(controller, UserCommand::Confirm);
                        handle(controller, UserCommand::Finish);
                    }
                    DispatchEvent::Cancelled { .. } | DispatchEvent::Reset { .. } => {
                        // drain the closing status line
                        while let Ok(event) = events.try_recv() {
                            render(&event);
                            record(event_log.as_ref(), &event);
                        }
                        return;
                    }
                    _ => {}
                }
            }
            Some(command) = commands.recv() => {
                if handle(controller, command) {
                    return;
                }
            }
        }
    }
}

fn dispatch(
    config: AppConfig,
    kind: String,
    location: Option<GeoPoint>,
    offline: bool,
    auto: bool,
    output: Option<PathBuf>,
    credentials: Option<Credentials>,
) -> Result<(), DispatchError> {
    if let Some(credentials) = credentials {
        let store = open_store(&config)?;
        let session = login(&store, &credentials)?;
        if store.account(&session)?.profile.is_incomplete() {
            println!("Incomplete medical record: blood type or allergies missing.");
            warn!("Calling for help with an incomplete medical record");
        }
        store.logout(session);
    }

    let route_provider: Arc<dyn RouteProvider> = if offline {
        Arc::new(StaticRouteProvider::no_path())
    } else {
        Arc::new(OpenRouteServiceProvider::new(&config.routing))
    };
    let position_source: Arc<dyn PositionSource> = match location {
        Some(location) => Arc::new(FixedPosition::new(location)),
        None => Arc::new(FixedPosition::denied()),
    };

    let (event_log, writer_handle) = match output {
        Some(output_file) => {
            let (event_tx, event_rx) = mpsc::channel::<DispatchEvent>();
            let handle = thread::spawn(move || writer::write_events(&output_file, event_rx));
            (Some(event_tx), Some(handle))
        }
        None => (None, None),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| DispatchError::RuntimeError { source: e })?;

    let result = runtime.block_on(async move {
        let (controller, events) =
            DispatchController::new(config.dispatch.clone(), route_provider, position_source);
        let (commands_tx, commands) = unbounded_channel();
        if !auto {
            thread::spawn(move || read_commands(commands_tx));
        }

        controller.request(EmergencyKind::new(kind)).await?;
        follow_call(&controller, events, commands, event_log, auto).await;
        controller.shutdown();
        Ok::<(), DispatchError>(())
    });

    if let Some(handle) = writer_handle {
        match handle.join() {
            Ok(Ok(written)) => info!("{} dispatch events written", written),
            Ok(Err(e)) => error!("Event log failed: {}", e),
            Err(_) => error!("Event log writer panicked"),
        }
    }
    result
}

fn profile(config: &AppConfig, action: ProfileAction) -> Result<(), DispatchError> {
    let mut store = open_store(config)?;
    match action {
        ProfileAction::Show { credentials } => {
            let session = login(&store, &credentials)?;
            print_account(&store.account(&session)?);
            store.logout(session);
        }
        ProfileAction::Update {
            credentials,
            name,
            new_email,
            phone,
            new_password,
            blood_type,
            age,
            weight,
            height,
            allergies,
            medications,
        } => {
            let session = login(&store, &credentials)?;
            let update = AccountUpdate {
                name,
                email: new_email,
                phone,
                password: new_password,
                blood_type: blood_type
                    .as_deref()
                    .map(str::parse::<BloodType>)
                    .transpose()?,
                age,
                weight,
                height,
                allergies,
                medications,
            };
            let account = store.update_account(&session, update)?;
            println!("Profile updated.");
            print_account(&account);
            store.logout(session);
        }
    }
    Ok(())
}

fn contacts(config: &AppConfig, action: ContactsAction) -> Result<(), DispatchError> {
    let mut store = open_store(config)?;
    match action {
        ContactsAction::List { credentials } => {
            let session = login(&store, &credentials)?;
            let contacts = store.contacts(&session)?;
            if contacts.is_empty() {
                println!("No emergency contacts.");
            }
            for contact in contacts {
                println!("{:>4}  {}  {}", contact.id, contact.name, contact.phone);
            }
            store.logout(session);
        }
        ContactsAction::Add {
            credentials,
            name,
            phone,
        } => {
            let session = login(&store, &credentials)?;
            let contact = store.add_contact(&session, &name, &phone)?;
            println!("Contact {} added.", contact.id);
            store.logout(session);
        }
        ContactsAction::Delete { credentials, id } => {
            let session = login(&store, &credentials)?;
            store.delete_contact(&session, id)?;
            println!("Contact {} removed.", id);
            store.logout(session);
        }
    }
    Ok(())
}

fn run(command: Commands) -> Result<(), DispatchError> {
    let config = AppConfig::load();
    match command {
        Commands::Dispatch {
            kind,
            lat,
            lng,
            offline,
            auto,
            output,
            email,
            password,
        } => {
            let location = lat.zip(lng).map(|(lat, lng)| GeoPoint::new(lat, lng));
            let credentials = email
                .zip(password)
                .map(|(email, password)| Credentials { email, password });
            dispatch(config, kind, location, offline, auto, output, credentials)
        }
        Commands::Triage => {
            for (i, preset) in EmergencyKind::PRESETS.iter().enumerate() {
                println!("{}. {}", i + 1, preset);
            }
            Ok(())
        }
        Commands::Register {
            email,
            password,
            name,
        } => {
            let mut store = open_store(&config)?;
            let session = store.register(&email, &password, &name)?;
            println!("Welcome, {}! Account {} created.", name.trim(), session.email());
            store.logout(session);
            Ok(())
        }
        Commands::Profile { action } => profile(&config, action),
        Commands::Contacts { action } => contacts(&config, action),
    }
}

fn main() {
    #[cfg(debug_assertions)]
    colog::init();

    let cli = Args::parse();
    if let Err(e) = ctrlc::set_handler(move || {
        println!("Exiting...");
        std::process::exit(0);
    }) {
        warn!("Could not set Ctrl-C handler: {}", e);
    }

    if let Err(e) = run(cli.command) {
        error!("{:?}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
