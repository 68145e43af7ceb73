//! Demo driver: two play sessions over the same save directory
//!
//! Session one loads a scene, creates a player, spawns a few coins, plays
//! for a while and quits. Session two starts from scratch and restores
//! everything, including the coins that only existed at runtime.
//!
//! Usage: `scene_persist_demo [save directory]`

use std::cell::RefCell;
use std::env;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use scene_persist::component::{ItemInfo, SaveInventory, SavePosition, SaveVisibility};
use scene_persist::settings::default_save_directory;
use scene_persist::{
    AssetResolver, AssetSource, FileStorage, GuidIdentity, PersistResult, PrefabInstance,
    PrefabLibrary, RuntimeInstances, SaveSettings, SaveableHandle, SaveableObject, StateRegistry,
    erase, shared,
};

const SCENE: &str = "Level1";
const FRAME: Duration = Duration::from_millis(16);

fn coin() -> PrefabInstance {
    PrefabInstance::configured(vec![
        ("position".to_string(), erase(&shared(SavePosition::default()))),
        ("visibility".to_string(), erase(&shared(SaveVisibility::default()))),
    ])
}

struct Session {
    registry: Rc<StateRegistry>,
    instances: RuntimeInstances,
}

impl Session {
    fn open(directory: &Path, settings: &SaveSettings) -> PersistResult<Self> {
        let storage = FileStorage::new(directory)?.with_pretty_print(settings.pretty_print);
        let registry = StateRegistry::new(settings.clone(), storage);

        let library: Rc<RefCell<dyn AssetResolver>> =
            Rc::new(RefCell::new(PrefabLibrary::new().with_resource("Coin", coin)));
        let mut instances = RuntimeInstances::new(&registry, library);
        instances.on_scene_loaded(SCENE)?;

        match registry.start()? {
            Some(slot) => println!("✓ Loaded existing save from slot {}", slot),
            None => {
                let slot = registry.available_slot().unwrap_or(0);
                registry.set_slot(slot)?;
                println!("No existing save found, starting new game in slot {}", slot);
            }
        }

        Ok(Session {
            registry,
            instances,
        })
    }

    fn play(&self, seconds: u64) -> PersistResult<()> {
        let frames = Duration::from_secs(seconds).as_millis() / FRAME.as_millis();
        for _ in 0..frames {
            self.registry.tick(FRAME)?;
        }
        Ok(())
    }

    fn quit(mut self) -> PersistResult<()> {
        self.registry.on_application_quitting()?;
        self.instances.on_scene_unloaded(SCENE)?;
        Ok(())
    }
}

struct Player {
    handle: SaveableHandle,
    position: Rc<RefCell<SavePosition>>,
    inventory: Rc<RefCell<SaveInventory>>,
}

impl Player {
    fn spawn(registry: &Rc<StateRegistry>) -> PersistResult<Self> {
        let position = shared(SavePosition::new([0.0, 0.0, 0.0]));
        let inventory = shared(SaveInventory::new());

        let handle = SaveableObject::new(GuidIdentity::with_id("player"), SCENE)
            .with_component("position", &position)
            .with_component("inventory", &inventory)
            .activate(registry)?;

        Ok(Player {
            handle,
            position,
            inventory,
        })
    }

    fn print(&self) {
        let position = self.position.borrow().position;
        println!(
            "  - Player {} at ({}, {}, {})",
            self.handle.id(),
            position[0],
            position[1],
            position[2]
        );
        for ItemInfo { name, count } in self.inventory.borrow().items() {
            println!("  - Carrying {} x {}", count, name);
        }
    }
}

fn first_session(directory: &Path, settings: &SaveSettings) -> PersistResult<()> {
    println!("Session 1");
    let session = Session::open(directory, settings)?;
    let player = Player::spawn(&session.registry)?;

    player.position.borrow_mut().position = [12.0, 0.0, -3.5];
    player.inventory.borrow_mut().add_item("Coin", 3);

    let coins = [
        session.instances.instantiate("Coin", AssetSource::Resources, None)?,
        session.instances.instantiate("Coin", AssetSource::Resources, None)?,
        session.instances.instantiate("Coin", AssetSource::Resources, None)?,
    ];
    if let Some(manager) = session.instances.manager(SCENE) {
        manager.borrow().with_component(&coins[0], |position: &mut SavePosition| {
            position.position = [4.0, 1.0, 0.0];
        });
    }
    // Picked up: gone for good, including its saved state
    session.instances.destroy(&coins[2])?;

    session.registry.set_int("deaths", 2);
    session.play(3)?;

    player.print();
    println!("  - Spawned {} coins, picked up 1", coins.len());

    player.handle.destroy(true)?;
    session.quit()?;
    println!("✓ Game saved successfully!");
    Ok(())
}

fn second_session(directory: &Path, settings: &SaveSettings) -> PersistResult<()> {
    println!("Session 2");
    let session = Session::open(directory, settings)?;
    let player = Player::spawn(&session.registry)?;
    player.print();

    let registry = &session.registry;
    if let Some(slot) = registry.active_slot() {
        if let Some(played) = registry.save_time_played(slot)? {
            println!("  - Time played: {:.1}s", played.as_secs_f32());
        }
    }
    println!("  - Deaths: {}", registry.get_int("deaths", 0));

    if let Some(manager) = session.instances.manager(SCENE) {
        let manager = manager.borrow();
        println!("  - Restored {} runtime instances", manager.len());
        for id in manager.instance_ids() {
            let position = manager.with_component(&id, |position: &mut SavePosition| position.position);
            if let Some(position) = position {
                println!("    - Coin {} at ({}, {}, {})", id, position[0], position[1], position[2]);
            }
        }
    }

    player.handle.destroy(true)?;
    session.quit()?;
    println!("✓ Game loaded successfully!");
    Ok(())
}

fn main() -> Result<(), String> {
    env_logger::init();

    let directory = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| default_save_directory("scene_persist_demo"));
    println!("Save directory: {}", directory.display());

    let settings = SaveSettings::load_or_default(directory.join("settings.json"))
        .map_err(|e| format!("Failed to read settings: {}", e))?;

    first_session(&directory, &settings).map_err(|e| format!("Session 1 failed: {}", e))?;
    second_session(&directory, &settings).map_err(|e| format!("Session 2 failed: {}", e))?;
    Ok(())
}
