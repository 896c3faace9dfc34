use crate::infra::{InMemoryUserStore, InProcessEventBus};
use async_trait::async_trait;
use clap::Args;
use onboarding::config::OutboxConfig;
use onboarding::error::AppError;
use onboarding::workflows::notifications::{
    DeliveryOutcome, EmailMessage, MailError, MailSender, NotificationDispatcher,
    NotificationTemplates,
};
use onboarding::workflows::residency::{
    ApartmentDirectory, ApartmentId, BcryptHasher, BlockSet, DirectoryError, EventMessage,
    OnboardingError, OutboxRelay, RegistrationPolicy, RegistrationRequest,
    ResidentOnboardingService, RoleRegistry, StatusUpdateRequest, User, UserStatus,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;

// Lowest cost bcrypt accepts; the demo favours speed over strength.
const DEMO_BCRYPT_COST: u32 = 4;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Email address of the sample registrant
    #[arg(long, default_value = "john.doe@example.com")]
    pub(crate) email: String,
    /// Apartment identifier to register against (the sample directory knows 1 and 2)
    #[arg(long, default_value_t = 1)]
    pub(crate) apartment: u64,
    /// Block name inside the apartment
    #[arg(long, default_value = "Block A")]
    pub(crate) block: String,
    /// Role assigned on approval
    #[arg(long, default_value = "resident")]
    pub(crate) role: String,
    /// Reject the registration instead of approving it
    #[arg(long)]
    pub(crate) reject: bool,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            email: "john.doe@example.com".to_string(),
            apartment: 1,
            block: "Block A".to_string(),
            role: "resident".to_string(),
            reject: false,
        }
    }
}

/// Fixed apartment directory so the demo runs without the apartment service.
struct SampleDirectory {
    apartments: BTreeMap<ApartmentId, BlockSet>,
}

impl SampleDirectory {
    fn new() -> Self {
        let mut apartments = BTreeMap::new();
        apartments.insert(
            ApartmentId(1),
            ["Block A", "Block B"].into_iter().map(String::from).collect(),
        );
        apartments.insert(
            ApartmentId(2),
            ["North Tower", "South Tower"]
                .into_iter()
                .map(String::from)
                .collect(),
        );
        Self { apartments }
    }
}

#[async_trait]
impl ApartmentDirectory for SampleDirectory {
    async fn lookup(&self, apartment_id: ApartmentId) -> Result<BlockSet, DirectoryError> {
        self.apartments
            .get(&apartment_id)
            .cloned()
            .ok_or(DirectoryError::NotFound(apartment_id))
    }
}

struct ConsoleMailer;

#[async_trait]
impl MailSender for ConsoleMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        println!("  mail to: {}", message.to);
        println!("    Subject: {}", message.subject);
        for line in message.body.lines() {
            println!("    | {line}");
        }
        Ok(())
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        email,
        apartment,
        block,
        role,
        reject,
    } = args;

    let store = Arc::new(InMemoryUserStore::default());
    let (bus, mut bus_receiver) = InProcessEventBus::channel(64);
    let relay = OutboxRelay::new(store.clone(), Arc::new(bus), &OutboxConfig::default());
    let dispatcher =
        NotificationDispatcher::new(Arc::new(ConsoleMailer), NotificationTemplates::default());
    let service = ResidentOnboardingService::new(
        store,
        Arc::new(SampleDirectory::new()),
        Arc::new(BcryptHasher::new(DEMO_BCRYPT_COST)),
        Arc::new(RoleRegistry::standard()),
        RegistrationPolicy::default(),
    );

    println!("Resident Onboarding Demo");
    println!("========================");
    println!("Sample directory: apartment 1 (Block A, Block B), apartment 2 (North Tower, South Tower)");
    println!();

    let user = service
        .register(RegistrationRequest {
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            email,
            password: "password123".to_string(),
            apartment_id: ApartmentId(apartment),
            block_name: block,
            apartment_number: "101".to_string(),
        })
        .await?;
    print_user("Registered", &user);
    deliver_events(&relay, &mut bus_receiver, &dispatcher).await?;

    let decision = if reject {
        StatusUpdateRequest {
            status: UserStatus::Rejected,
            role_name: None,
        }
    } else {
        StatusUpdateRequest {
            status: UserStatus::Approved,
            role_name: Some(role),
        }
    };
    let user = service.transition(&user.id, decision)?;
    print_user("Decision recorded", &user);
    deliver_events(&relay, &mut bus_receiver, &dispatcher).await?;

    println!();
    println!(
        "Pending approvals remaining: {}",
        service.pending(50)?.len()
    );
    Ok(())
}

fn print_user(heading: &str, user: &User) {
    println!("{heading}:");
    println!("  id: {}", user.id);
    println!(
        "  {} {} <{}> apartment {} / {} / unit {}",
        user.first_name,
        user.last_name,
        user.email,
        user.apartment_id,
        user.block_name,
        user.apartment_number
    );
    println!("  status: {}  role: {}", user.status, user.role);
}

/// One relay pass followed by draining everything it put on the bus.
async fn deliver_events(
    relay: &OutboxRelay<InMemoryUserStore, InProcessEventBus>,
    bus_receiver: &mut mpsc::Receiver<EventMessage>,
    dispatcher: &NotificationDispatcher<ConsoleMailer>,
) -> Result<(), AppError> {
    relay
        .relay_pending()
        .await
        .map_err(OnboardingError::from)?;

    while let Ok(message) = bus_receiver.try_recv() {
        println!("  event {} (key {})", message.topic, message.key);
        match dispatcher.dispatch(&message).await {
            Ok(DeliveryOutcome::Delivered) => {}
            Ok(DeliveryOutcome::SendFailed) => println!("  (email could not be sent)"),
            Err(err) => println!("  (skipped undecodable event: {err})"),
        }
    }
    Ok(())
}
