//! The unified record: the in-memory superset of every output field.
//!
//! All string fields are interned `&'static str`, so records are cheap to
//! copy around worker channels and equal values compare by content without
//! touching the allocator. "Unset" is the zero value / empty string / empty
//! map; `location.has_coordinates` distinguishes an unset location from a
//! real (0.0, 0.0) fix.

use std::collections::HashMap;

use rustc_hash::FxHashMap;

use crate::config;
use crate::interner;
use crate::mmdb::Value;
use crate::sources::ProxyFlags;

/// Localized names keyed by interned language tag
pub type NameMap = FxHashMap<&'static str, &'static str>;

/// City sub-record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CityRecord {
    /// GeoNames identifier
    pub geoname_id: u32,
    /// Localized names
    pub names: NameMap,
}

/// Continent sub-record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContinentRecord {
    /// Two-letter continent code
    pub code: &'static str,
    /// GeoNames identifier
    pub geoname_id: u32,
    /// Localized names
    pub names: NameMap,
}

/// Country sub-record (also used for registered_country)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountryRecord {
    /// GeoNames identifier
    pub geoname_id: u32,
    /// ISO 3166-1 code
    pub iso_code: &'static str,
    /// Localized names
    pub names: NameMap,
}

/// Location sub-record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationRecord {
    /// Accuracy radius in kilometers
    pub accuracy_radius: u16,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// US metro code
    pub metro_code: u16,
    /// IANA timezone name
    pub time_zone: &'static str,
    /// Whether latitude/longitude were explicitly set; keeps a genuine
    /// (0, 0) apart from "no data"
    pub has_coordinates: bool,
}

/// Postal sub-record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostalRecord {
    /// Postal code
    pub code: &'static str,
}

/// Subdivision (state / province) sub-record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubdivisionRecord {
    /// GeoNames identifier
    pub geoname_id: u32,
    /// ISO 3166-2 code
    pub iso_code: &'static str,
    /// Localized names
    pub names: NameMap,
}

/// ASN sub-record; populated from exactly one source per prefix
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AsnRecord {
    /// Autonomous system number
    pub number: u32,
    /// Operator organization name
    pub organization: &'static str,
    /// Operator domain (primary ASN source only)
    pub domain: &'static str,
}

/// The unified output record for one prefix
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedRecord {
    /// City sub-record
    pub city: CityRecord,
    /// Continent sub-record
    pub continent: ContinentRecord,
    /// Country sub-record
    pub country: CountryRecord,
    /// Location sub-record
    pub location: LocationRecord,
    /// Postal sub-record
    pub postal: PostalRecord,
    /// Country of registration
    pub registered_country: CountryRecord,
    /// Subdivisions, most to least significant
    pub subdivisions: Vec<SubdivisionRecord>,
    /// ASN sub-record
    pub asn: AsnRecord,
    /// Proxy classification flags
    pub proxy: ProxyFlags,
}

impl MergedRecord {
    /// Clear all fields for reuse
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// True when the record carries nothing worth emitting. Empty records
    /// are never inserted into the output trie.
    pub fn is_empty(&self) -> bool {
        self.country.iso_code.is_empty()
            && self.city.geoname_id == 0
            && self.city.names.is_empty()
            && self.asn.number == 0
            && !self.location.has_coordinates
    }

    /// Convert to the output wire value, emitting only non-empty fields.
    /// Returns `None` when every sub-record is empty.
    pub fn to_data_value(&self) -> Option<Value> {
        let mut entries: Vec<(&'static str, Value)> = Vec::with_capacity(9);

        if let Some(city) = city_value(&self.city) {
            entries.push(("city", city));
        }
        if let Some(continent) = continent_value(&self.continent) {
            entries.push(("continent", continent));
        }
        if let Some(country) = country_value(&self.country) {
            entries.push(("country", country));
        }
        if let Some(location) = location_value(&self.location) {
            entries.push(("location", location));
        }
        if let Some(postal) = postal_value(&self.postal) {
            entries.push(("postal", postal));
        }
        if let Some(registered) = country_value(&self.registered_country) {
            entries.push(("registered_country", registered));
        }
        if let Some(subdivisions) = subdivisions_value(&self.subdivisions) {
            entries.push(("subdivisions", subdivisions));
        }
        if let Some(asn) = asn_value(&self.asn) {
            entries.push(("asn", asn));
        }
        if let Some(proxy) = proxy_value(&self.proxy) {
            entries.push(("proxy", proxy));
        }

        if entries.is_empty() {
            None
        } else {
            Some(Value::Map(entries))
        }
    }
}

/// Intern a decoded name map, keeping only the supported language tags.
pub(crate) fn intern_names(source: &HashMap<String, String>) -> NameMap {
    let mut names = NameMap::default();
    for (lang, name) in source {
        if name.is_empty() {
            continue;
        }
        if config::SUPPORTED_LANGUAGES.contains(&lang.as_str()) {
            names.insert(interner::intern(lang), interner::intern(name));
        }
    }
    names
}

fn names_value(names: &NameMap) -> Option<Value> {
    if names.is_empty() {
        return None;
    }
    Some(Value::Map(
        names.iter().map(|(&lang, &name)| (lang, Value::Str(name))).collect(),
    ))
}

fn city_value(city: &CityRecord) -> Option<Value> {
    let mut entries = Vec::with_capacity(2);
    if city.geoname_id != 0 {
        entries.push(("geoname_id", Value::Uint32(city.geoname_id)));
    }
    if let Some(names) = names_value(&city.names) {
        entries.push(("names", names));
    }
    (!entries.is_empty()).then_some(Value::Map(entries))
}

fn continent_value(continent: &ContinentRecord) -> Option<Value> {
    let mut entries = Vec::with_capacity(3);
    if !continent.code.is_empty() {
        entries.push(("code", Value::Str(continent.code)));
    }
    if continent.geoname_id != 0 {
        entries.push(("geoname_id", Value::Uint32(continent.geoname_id)));
    }
    if let Some(names) = names_value(&continent.names) {
        entries.push(("names", names));
    }
    (!entries.is_empty()).then_some(Value::Map(entries))
}

fn country_value(country: &CountryRecord) -> Option<Value> {
    let mut entries = Vec::with_capacity(3);
    if country.geoname_id != 0 {
        entries.push(("geoname_id", Value::Uint32(country.geoname_id)));
    }
    if !country.iso_code.is_empty() {
        entries.push(("iso_code", Value::Str(country.iso_code)));
    }
    if let Some(names) = names_value(&country.names) {
        entries.push(("names", names));
    }
    (!entries.is_empty()).then_some(Value::Map(entries))
}

fn location_value(location: &LocationRecord) -> Option<Value> {
    let mut entries = Vec::with_capacity(5);
    if location.accuracy_radius != 0 {
        entries.push(("accuracy_radius", Value::Uint16(location.accuracy_radius)));
    }
    // Coordinates are atomic: both or neither, gated on the explicit flag.
    if location.has_coordinates {
        entries.push(("latitude", Value::Double(location.latitude)));
        entries.push(("longitude", Value::Double(location.longitude)));
    }
    if location.metro_code != 0 {
        entries.push(("metro_code", Value::Uint16(location.metro_code)));
    }
    if !location.time_zone.is_empty() {
        entries.push(("time_zone", Value::Str(location.time_zone)));
    }
    (!entries.is_empty()).then_some(Value::Map(entries))
}

fn postal_value(postal: &PostalRecord) -> Option<Value> {
    if postal.code.is_empty() {
        return None;
    }
    Some(Value::Map(vec![("code", Value::Str(postal.code))]))
}

fn subdivision_value(sub: &SubdivisionRecord) -> Option<Value> {
    let mut entries = Vec::with_capacity(3);
    if sub.geoname_id != 0 {
        entries.push(("geoname_id", Value::Uint32(sub.geoname_id)));
    }
    if !sub.iso_code.is_empty() {
        entries.push(("iso_code", Value::Str(sub.iso_code)));
    }
    if let Some(names) = names_value(&sub.names) {
        entries.push(("names", names));
    }
    (!entries.is_empty()).then_some(Value::Map(entries))
}

fn subdivisions_value(subdivisions: &[SubdivisionRecord]) -> Option<Value> {
    // Entirely empty subdivision objects are dropped; one populated field
    // keeps the entry.
    let items: Vec<Value> = subdivisions.iter().filter_map(subdivision_value).collect();
    (!items.is_empty()).then_some(Value::Array(items))
}

fn asn_value(asn: &AsnRecord) -> Option<Value> {
    let mut entries = Vec::with_capacity(3);
    if asn.number != 0 {
        entries.push(("autonomous_system_number", Value::Uint32(asn.number)));
    }
    if !asn.organization.is_empty() {
        entries.push((
            "autonomous_system_organization",
            Value::Str(asn.organization),
        ));
    }
    if !asn.domain.is_empty() {
        entries.push(("as_domain", Value::Str(asn.domain)));
    }
    (!entries.is_empty()).then_some(Value::Map(entries))
}

fn proxy_value(proxy: &ProxyFlags) -> Option<Value> {
    // Flags are emitted only when true; a false flag and an absent flag
    // mean the same thing to consumers.
    let mut entries = Vec::with_capacity(7);
    if proxy.is_proxy {
        entries.push(("is_proxy", Value::Bool(true)));
    }
    if proxy.is_vpn {
        entries.push(("is_vpn", Value::Bool(true)));
    }
    if proxy.is_tor {
        entries.push(("is_tor", Value::Bool(true)));
    }
    if proxy.is_hosting {
        entries.push(("is_hosting", Value::Bool(true)));
    }
    if proxy.is_cdn {
        entries.push(("is_cdn", Value::Bool(true)));
    }
    if proxy.is_school {
        entries.push(("is_school", Value::Bool(true)));
    }
    if proxy.is_anonymous {
        entries.push(("is_anonymous", Value::Bool(true)));
    }
    (!entries.is_empty()).then_some(Value::Map(entries))
}
