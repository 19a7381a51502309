use std::collections::BTreeMap;

use crate::types::{CanonicalEvent, InboundEvent, TypedValue};

/// Reshape a flat inbound event into its canonical nested form.
///
/// Total and side-effect free. Slots are inserted in ascending order, so when
/// two slots share a key the later slot overwrites the earlier one. An empty
/// key is kept as a regular map key.
pub fn transform(event: InboundEvent) -> CanonicalEvent {
    let InboundEvent {
        event,
        event_type,
        app_id,
        user_id,
        message_id,
        page_title,
        page_url,
        browser_language,
        screen_size,
        attr1_key,
        attr1_value,
        attr1_type,
        attr2_key,
        attr2_value,
        attr2_type,
        trait1_key,
        trait1_value,
        trait1_type,
        trait2_key,
        trait2_value,
        trait2_type,
        trait3_key,
        trait3_value,
        trait3_type,
    } = event;

    let attributes = collect_slots([
        (attr1_key, attr1_value, attr1_type),
        (attr2_key, attr2_value, attr2_type),
    ]);

    let traits = collect_slots([
        (trait1_key, trait1_value, trait1_type),
        (trait2_key, trait2_value, trait2_type),
        (trait3_key, trait3_value, trait3_type),
    ]);

    CanonicalEvent {
        event,
        event_type,
        app_id,
        user_id,
        message_id,
        page_title,
        page_url,
        browser_language,
        screen_size,
        attributes,
        traits,
    }
}

fn collect_slots<const N: usize>(
    slots: [(String, String, String); N],
) -> BTreeMap<String, TypedValue> {
    let mut map = BTreeMap::new();
    for (key, value, kind) in slots {
        // Last write wins on duplicate keys.
        map.insert(key, TypedValue { value, kind });
    }
    map
}
