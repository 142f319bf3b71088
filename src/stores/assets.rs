use serde::{Deserialize, Serialize};

use crate::apply_patch;
use crate::storage::{self, Persisted, StorageError, Store};
use crate::types::{Asset, AssetPatch, AssetStatus, AssetType, NewAsset};

use super::{new_id, required};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AssetState {
    pub assets: Vec<Asset>,
}

impl Persisted for AssetState {
    const KEY: &'static str = "asset-storage";

    fn seed() -> Self {
        let asset = |name: &str, asset_type, status, location: &str| Asset {
            id: new_id(),
            name: name.to_string(),
            asset_type,
            status,
            location: location.to_string(),
            description: None,
            last_maintenance: None,
            next_maintenance: None,
        };
        AssetState {
            assets: vec![
                asset("Laptop Dell XPS", AssetType::Equipment, AssetStatus::Available, "Unit ICT"),
                asset("Meeting Room A", AssetType::Room, AssetStatus::InUse, "Aras 1"),
                asset("Projector HD", AssetType::Equipment, AssetStatus::Available, "Unit ICT"),
                asset("Meeting Room B", AssetType::Room, AssetStatus::Available, "Aras 2"),
            ],
        }
    }
}

impl Store<AssetState> {
    pub fn list_assets(&self) -> &[Asset] {
        &self.state().assets
    }

    pub fn assets_by_status(&self, status: AssetStatus) -> Vec<Asset> {
        self.state()
            .assets
            .iter()
            .filter(|a| a.status == status)
            .cloned()
            .collect()
    }

    pub fn add_asset(&mut self, input: NewAsset) -> Result<Asset, String> {
        let asset = Asset {
            id: new_id(),
            name: required(&input.name, "name")?,
            asset_type: input.asset_type,
            status: input.status,
            location: input.location,
            description: input.description,
            last_maintenance: input.last_maintenance,
            next_maintenance: input.next_maintenance,
        };
        self.state_mut().assets.push(asset.clone());
        Ok(asset)
    }

    pub fn update_asset(&mut self, id: &str, patch: AssetPatch) -> Result<Asset, StorageError> {
        storage::modify(&mut self.state_mut().assets, id, "Asset", |asset| {
            apply_patch!(asset, patch; name, asset_type, status, location;
                optional: description, last_maintenance, next_maintenance);
        })
    }

    /// Booking shortcut used by the room/asset widget.
    pub fn set_asset_status(&mut self, id: &str, status: AssetStatus) -> Result<Asset, StorageError> {
        storage::modify(&mut self.state_mut().assets, id, "Asset", |asset| {
            asset.status = status;
        })
    }

    pub fn delete_asset(&mut self, id: &str) -> Result<Asset, StorageError> {
        storage::remove(&mut self.state_mut().assets, id, "Asset")
    }
}
