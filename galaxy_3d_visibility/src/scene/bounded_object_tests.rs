use super::*;

#[test]
fn test_decals_and_roads_share_a_list() {
    assert_eq!(RenderKind::Decal.list(), ObjectList::DecalsAndRoads);
    assert_eq!(RenderKind::Road.list(), ObjectList::DecalsAndRoads);
    for kind in RenderKind::ALL {
        if !matches!(kind, RenderKind::Decal | RenderKind::Road) {
            assert_eq!(kind.list(), ObjectList::General, "{:?}", kind);
        }
    }
}

#[test]
fn test_volume_kinds_resolve_on_main_thread() {
    assert!(RenderKind::Mesh.is_worker_safe());
    assert!(RenderKind::Light.is_worker_safe());
    assert!(!RenderKind::FogVolume.is_worker_safe());
    assert!(!RenderKind::WaterVolume.is_worker_safe());
    assert!(!RenderKind::Cloud.is_worker_safe());
    assert!(!RenderKind::Particles.is_worker_safe());
}

#[test]
fn test_only_lights_are_lights() {
    let lights: Vec<_> = RenderKind::ALL.iter().filter(|k| k.is_light()).collect();
    assert_eq!(lights, vec![&RenderKind::Light]);
}

#[test]
fn test_object_list_indices_are_dense() {
    for (i, list) in ObjectList::ALL.iter().enumerate() {
        assert_eq!(list.index(), i);
    }
    assert_eq!(ObjectList::ALL.len(), ObjectList::COUNT);
}

#[test]
fn test_non_caster_flags() {
    assert!(RenderFlags::NON_CASTER.contains(RenderFlags::HIDDEN));
    assert!(RenderFlags::NON_CASTER.contains(RenderFlags::STATIC_INSTANCING));
    assert!(!RenderFlags::NON_CASTER.contains(RenderFlags::CASTS_SHADOWS));
    assert_eq!(
        RenderFlags::CASTER_BITS,
        RenderFlags::CASTS_SHADOWS | RenderFlags::HAS_CAST_SHADOWS
    );
}

#[test]
fn test_default_lod_info_is_single_lod() {
    let info = LodInfo::default();
    assert_eq!(info.lod_count, 1);
    assert_eq!(info.lod_ratio_norm, 1.0);
    assert!(info.lod_distances.is_none());
}
