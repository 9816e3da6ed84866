//! Offset catalog properties over arbitrary joint counts and layouts.

use ecat_common::consts::{DEFAULT_PRODUCT_CODE, DEFAULT_VENDOR_ID, MAX_JOINTS};
use ecat_common::fieldbus::pdo::{DataItem, JOINT_PROCESS_DATA_BYTES};
use ecat_common::fieldbus::types::{DeviceProfile, SlaveHandle};
use ecat_master::catalog::{CatalogError, JointBinding, JointOffsets, SlaveBindingCatalog};
use ecat_master::drivers::simulation::SimulationDriver;
use ecat_master::lifecycle::{LifecycleSettings, MasterLifecycleManager};
use proptest::prelude::*;
use std::collections::HashSet;

// ─── Helpers ───────────────────────────────────────────────────────

fn settings(joint_count: usize) -> LifecycleSettings {
    LifecycleSettings {
        bus_index: 0,
        joint_count,
        profile: DeviceProfile {
            vendor_id: DEFAULT_VENDOR_ID,
            product_code: DEFAULT_PRODUCT_CODE,
        },
        max_current: 400,
        send_interval_us: 1000,
    }
}

/// Place the `n × 12` items back to back in the given order.
fn packed_catalog(n: usize, order: &[usize]) -> (SlaveBindingCatalog, usize) {
    let mut offsets = vec![[0usize; DataItem::COUNT]; n];
    let mut cursor = 0;
    for &slot in order {
        let (joint, item) = (slot / DataItem::COUNT, DataItem::ALL[slot % DataItem::COUNT]);
        offsets[joint][item.index()] = cursor;
        cursor += item.byte_len();
    }

    let mut catalog = SlaveBindingCatalog::new();
    for (joint, joint_offsets) in offsets.iter().enumerate() {
        catalog
            .push(JointBinding {
                joint,
                position: joint as u16 + 1,
                slave: SlaveHandle(joint as u16),
                offsets: JointOffsets::from_registration(joint_offsets).unwrap(),
            })
            .unwrap();
    }
    (catalog, cursor)
}

/// Joint count plus a random placement order of all its items.
fn layout() -> impl Strategy<Value = (usize, Vec<usize>)> {
    (1..=MAX_JOINTS).prop_flat_map(|n| {
        let slots: Vec<usize> = (0..n * DataItem::COUNT).collect();
        (Just(n), Just(slots).prop_shuffle())
    })
}

// ─── Properties ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn activated_offsets_are_distinct_and_in_domain(n in 1..=MAX_JOINTS) {
        let mut master = MasterLifecycleManager::new(
            Box::new(SimulationDriver::with_slaves(n)),
            settings(n),
        );
        master.acquire().unwrap();
        master.create_domain().unwrap();
        master.configure_all_joints().unwrap();
        let domain = master.activate().unwrap();

        prop_assert_eq!(domain.size, n * JOINT_PROCESS_DATA_BYTES);

        let mut seen = HashSet::new();
        for binding in master.catalog().iter() {
            for (_, start, end) in binding.offsets.ranges() {
                prop_assert!(end <= domain.size);
                prop_assert!(seen.insert(start));
            }
        }
        prop_assert_eq!(seen.len(), n * DataItem::COUNT);
    }

    #[test]
    fn any_packed_layout_validates((n, order) in layout()) {
        let (catalog, size) = packed_catalog(n, &order);
        prop_assert_eq!(size, n * JOINT_PROCESS_DATA_BYTES);
        prop_assert_eq!(catalog.validate(size), Ok(()));
    }

    #[test]
    fn truncated_domain_is_rejected((n, order) in layout()) {
        let (catalog, size) = packed_catalog(n, &order);
        let is_out_of_bounds = matches!(
            catalog.validate(size - 1),
            Err(CatalogError::OutOfBounds { .. })
        );
        prop_assert!(is_out_of_bounds);
    }

    #[test]
    fn shared_offset_is_rejected((n, order) in layout(), pick in any::<(usize, usize)>()) {
        let total = n * DataItem::COUNT;
        let (a, b) = (pick.0 % total, pick.1 % total);
        prop_assume!(a != b);

        // Move item b onto the offset of item a.
        let (a_joint, a_item) = (a / DataItem::COUNT, DataItem::ALL[a % DataItem::COUNT]);
        let (b_joint, b_item) = (b / DataItem::COUNT, DataItem::ALL[b % DataItem::COUNT]);
        let (packed, size) = packed_catalog(n, &order);

        let moved_to = packed
            .get(a_joint)
            .map(|a_binding| a_binding.offsets.of(a_item))
            .unwrap();

        let mut catalog = SlaveBindingCatalog::new();
        for binding in packed.iter() {
            let mut offsets: Vec<usize> = DataItem::ALL
                .iter()
                .map(|item| binding.offsets.of(*item))
                .collect();
            if binding.joint == b_joint {
                offsets[b_item.index()] = moved_to;
            }
            catalog
                .push(JointBinding {
                    offsets: JointOffsets::from_registration(&offsets).unwrap(),
                    ..*binding
                })
                .unwrap();
        }

        let result = catalog.validate(size);
        let rejected_as_expected = if moved_to + b_item.byte_len() > size {
            matches!(result, Err(CatalogError::OutOfBounds { .. }))
        } else {
            matches!(result, Err(CatalogError::Overlap { .. }))
        };
        prop_assert!(rejected_as_expected, "unexpected result: {:?}", result);
    }
}
