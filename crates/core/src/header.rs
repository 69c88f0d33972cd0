//! The Header Store: bundle and composition metadata of one document.
//!
//! Everything here is written into the Bundle and Composition on export and read back from them
//! on import. Identifiers left unset are generated on export.

use crate::{PioError, PioResult};
use indexmap::IndexMap;
use pio_types::FhirDateTime;
use pio_uuid::ResourceUuid;
use std::fmt;

/// Categories of resources handed to the patient on discharge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GivenDeviceCategory {
    DeviceAid,
    Medication,
    SourceOfInformation,
    Device,
    OtherItem,
}

impl GivenDeviceCategory {
    pub const ALL: [GivenDeviceCategory; 5] = [
        GivenDeviceCategory::DeviceAid,
        GivenDeviceCategory::Medication,
        GivenDeviceCategory::SourceOfInformation,
        GivenDeviceCategory::Device,
        GivenDeviceCategory::OtherItem,
    ];

    /// Internal resource-type name of the category.
    pub fn resource_name(self) -> &'static str {
        match self {
            GivenDeviceCategory::DeviceAid => "KBV_PR_MIO_ULB_Device_Aid",
            GivenDeviceCategory::Medication => "KBV_PR_MIO_ULB_Medication",
            GivenDeviceCategory::SourceOfInformation => {
                "KBV_PR_MIO_ULB_Provenance_Source_of_Information"
            }
            GivenDeviceCategory::Device => "KBV_PR_MIO_ULB_Device",
            GivenDeviceCategory::OtherItem => "KBV_PR_MIO_ULB_Device_Other_Item",
        }
    }

    pub fn from_resource_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.resource_name() == name)
    }
}

impl fmt::Display for GivenDeviceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource_name())
    }
}

/// Bundle and composition metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct HeaderStore {
    receiving_institution: Option<ResourceUuid>,
    patient: Option<ResourceUuid>,
    composition_date: Option<FhirDateTime>,
    bundle_timestamp: Option<FhirDateTime>,
    authors: Vec<ResourceUuid>,
    bundle_uuid: Option<ResourceUuid>,
    bundle_identifier_uuid: Option<ResourceUuid>,
    composition_uuid: Option<ResourceUuid>,
    given_devices: IndexMap<GivenDeviceCategory, Vec<ResourceUuid>>,
}

impl Default for HeaderStore {
    fn default() -> Self {
        Self {
            receiving_institution: None,
            patient: None,
            composition_date: None,
            bundle_timestamp: None,
            authors: Vec::new(),
            bundle_uuid: None,
            bundle_identifier_uuid: None,
            composition_uuid: None,
            given_devices: empty_given_devices(),
        }
    }
}

fn empty_given_devices() -> IndexMap<GivenDeviceCategory, Vec<ResourceUuid>> {
    GivenDeviceCategory::ALL
        .into_iter()
        .map(|c| (c, Vec::new()))
        .collect()
}

impl HeaderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_receiving_institution(&mut self, uuid: ResourceUuid) {
        self.receiving_institution = Some(uuid);
    }

    pub fn clear_receiving_institution(&mut self) {
        self.receiving_institution = None;
    }

    /// # Errors
    ///
    /// Returns [`PioError::NoReceivingInstitution`] if none is set.
    pub fn receiving_institution(&self) -> PioResult<ResourceUuid> {
        self.receiving_institution
            .ok_or(PioError::NoReceivingInstitution)
    }

    pub fn has_receiving_institution(&self) -> bool {
        self.receiving_institution.is_some()
    }

    pub fn set_patient(&mut self, uuid: ResourceUuid) {
        self.patient = Some(uuid);
    }

    pub fn patient(&self) -> Option<ResourceUuid> {
        self.patient
    }

    pub fn set_composition_date(&mut self, date: FhirDateTime) {
        self.composition_date = Some(date);
    }

    pub fn composition_date(&self) -> Option<&FhirDateTime> {
        self.composition_date.as_ref()
    }

    pub fn set_bundle_timestamp(&mut self, timestamp: FhirDateTime) {
        self.bundle_timestamp = Some(timestamp);
    }

    pub fn bundle_timestamp(&self) -> Option<&FhirDateTime> {
        self.bundle_timestamp.as_ref()
    }

    pub fn add_author(&mut self, uuid: ResourceUuid) {
        self.authors.push(uuid);
    }

    /// Removes every occurrence of `uuid` from the author list.
    ///
    /// # Errors
    ///
    /// Returns [`PioError::AuthorNotFound`] if `uuid` is not an author.
    pub fn delete_author(&mut self, uuid: &ResourceUuid) -> PioResult<()> {
        let before = self.authors.len();
        self.authors.retain(|a| a != uuid);
        if self.authors.len() == before {
            return Err(PioError::AuthorNotFound(uuid.to_string()));
        }
        Ok(())
    }

    pub fn authors(&self) -> &[ResourceUuid] {
        &self.authors
    }

    pub fn set_bundle_uuid(&mut self, uuid: ResourceUuid) {
        self.bundle_uuid = Some(uuid);
    }

    pub fn bundle_uuid(&self) -> Option<ResourceUuid> {
        self.bundle_uuid
    }

    pub fn set_bundle_identifier_uuid(&mut self, uuid: ResourceUuid) {
        self.bundle_identifier_uuid = Some(uuid);
    }

    pub fn bundle_identifier_uuid(&self) -> Option<ResourceUuid> {
        self.bundle_identifier_uuid
    }

    pub fn set_composition_uuid(&mut self, uuid: ResourceUuid) {
        self.composition_uuid = Some(uuid);
    }

    pub fn composition_uuid(&self) -> Option<ResourceUuid> {
        self.composition_uuid
    }

    /// Returns the bundle, bundle identifier and composition UUIDs, generating any that are unset.
    pub fn ensure_identifiers(&mut self) -> (ResourceUuid, ResourceUuid, ResourceUuid) {
        let bundle = *self.bundle_uuid.get_or_insert_with(ResourceUuid::new);
        let identifier = *self
            .bundle_identifier_uuid
            .get_or_insert_with(ResourceUuid::new);
        let composition = *self.composition_uuid.get_or_insert_with(ResourceUuid::new);
        (bundle, identifier, composition)
    }

    /// Adds `uuid` to `category` unless already present.
    pub fn add_given_device(&mut self, uuid: ResourceUuid, category: GivenDeviceCategory) {
        let list = self.given_devices.entry(category).or_default();
        if !list.contains(&uuid) {
            list.push(uuid);
        }
    }

    /// Removes `uuid` from `category`; absent UUIDs are ignored.
    pub fn delete_given_device(&mut self, uuid: &ResourceUuid, category: GivenDeviceCategory) {
        if let Some(list) = self.given_devices.get_mut(&category) {
            list.retain(|u| u != uuid);
        }
    }

    pub fn given_devices(&self, category: GivenDeviceCategory) -> &[ResourceUuid] {
        self.given_devices
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn all_given_devices(&self) -> &IndexMap<GivenDeviceCategory, Vec<ResourceUuid>> {
        &self.given_devices
    }

    pub fn clear_given_devices(&mut self) {
        self.given_devices = empty_given_devices();
    }

    /// Resets every header field, given devices included.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uuid(s: &str) -> ResourceUuid {
        ResourceUuid::parse(s).expect("uuid")
    }

    #[test]
    fn delete_unknown_author_fails() {
        let mut header = HeaderStore::new();
        let a = uuid("39f928a1-52f6-4563-8918-214cb3b2b55f");
        let b = uuid("9d4b229e-40bf-4bca-8680-9657895363ea");
        header.add_author(a);

        let err = header.delete_author(&b).expect_err("not an author");
        assert!(matches!(err, PioError::AuthorNotFound(_)));

        header.delete_author(&a).expect("delete");
        assert!(header.authors().is_empty());
    }

    #[test]
    fn receiving_institution_set_clear_get() {
        let mut header = HeaderStore::new();
        assert!(matches!(
            header.receiving_institution(),
            Err(PioError::NoReceivingInstitution)
        ));

        let org = uuid("9d4b229e-40bf-4bca-8680-9657895363ea");
        header.set_receiving_institution(org);
        assert_eq!(header.receiving_institution().expect("set"), org);

        header.clear_receiving_institution();
        assert!(!header.has_receiving_institution());
    }

    #[test]
    fn given_devices_are_set_like() {
        let mut header = HeaderStore::new();
        let device = uuid("2a73739e-7df1-4a61-a79d-8d95ae45a563");

        header.add_given_device(device, GivenDeviceCategory::DeviceAid);
        header.add_given_device(device, GivenDeviceCategory::DeviceAid);
        assert_eq!(header.given_devices(GivenDeviceCategory::DeviceAid), &[device]);
        assert!(header.given_devices(GivenDeviceCategory::Medication).is_empty());

        header.delete_given_device(&device, GivenDeviceCategory::DeviceAid);
        header.delete_given_device(&device, GivenDeviceCategory::DeviceAid);
        assert!(header.given_devices(GivenDeviceCategory::DeviceAid).is_empty());
        assert_eq!(header.all_given_devices().len(), 5);
    }

    #[test]
    fn ensure_identifiers_keeps_existing_values() {
        let mut header = HeaderStore::new();
        let bundle = uuid("e029b2b8-5dc6-4feb-990a-7471fb9b54e3");
        header.set_bundle_uuid(bundle);

        let (b, i, c) = header.ensure_identifiers();
        assert_eq!(b, bundle);
        assert_eq!(header.bundle_identifier_uuid(), Some(i));
        assert_eq!(header.composition_uuid(), Some(c));
        assert_eq!(header.ensure_identifiers(), (b, i, c));
    }

    #[test]
    fn category_names_round_trip() {
        for category in GivenDeviceCategory::ALL {
            assert_eq!(
                GivenDeviceCategory::from_resource_name(category.resource_name()),
                Some(category)
            );
        }
        assert_eq!(GivenDeviceCategory::from_resource_name("KBV_PR_MIO_ULB_Patient"), None);
    }
}
