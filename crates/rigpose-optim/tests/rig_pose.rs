//! Integration tests for multi-camera rig-pose estimation on a synthetic
//! three-camera rig.

use nalgebra::{Rotation3, Translation3};
use rigpose_core::synthetic::{centered_grid_points, project_rig_point, UniformPixelNoise};
use rigpose_core::{Iso3, Mat3, Pt3, Real, Vec2};
use rigpose_optim::{estimate_rig_pose, estimate_rig_pose_bundles, RigPoseError, RigPoseEstimate,
    RigPoseOptions};

fn make_rig() -> (Vec<Iso3>, Vec<Mat3>) {
    let kmtx = Mat3::new(800.0, 0.0, 640.0, 0.0, 780.0, 360.0, 0.0, 0.0, 1.0);

    let cam_poses = vec![
        Iso3::translation(0.0, 0.0, -1.5),
        Iso3::from_parts(
            Translation3::new(0.4, 0.1, -1.4),
            Rotation3::from_euler_angles(0.0, -0.2, 0.0).into(),
        ),
        Iso3::from_parts(
            Translation3::new(-0.4, -0.1, -1.6),
            Rotation3::from_euler_angles(0.05, 0.15, 0.0).into(),
        ),
    ];

    (cam_poses, vec![kmtx; 3])
}

/// Project the target through every camera; invisible points keep a zero
/// weight and a meaningless pixel, exactly like real detector output.
fn observe(
    points3d: &[Pt3],
    rig_pose: &Iso3,
    cam_poses: &[Iso3],
    cam_matrices: &[Mat3],
    visible: impl Fn(usize, usize) -> bool,
    noise: Option<UniformPixelNoise>,
) -> (Vec<Vec<Vec2>>, Vec<Vec<Real>>) {
    let mut points2d = Vec::with_capacity(cam_poses.len());
    let mut weights = Vec::with_capacity(cam_poses.len());

    for (cam, (pose, kmtx)) in cam_poses.iter().zip(cam_matrices.iter()).enumerate() {
        let mut obs = Vec::with_capacity(points3d.len());
        let mut w = Vec::with_capacity(points3d.len());
        for (idx, pw) in points3d.iter().enumerate() {
            let pixel = project_rig_point(kmtx, pose, rig_pose, pw).expect("point behind camera");
            let pixel = match noise {
                Some(n) => n.apply(cam, idx, pixel),
                None => pixel,
            };
            if visible(cam, idx) {
                obs.push(pixel);
                w.push(1.0);
            } else {
                obs.push(Vec2::zeros());
                w.push(0.0);
            }
        }
        points2d.push(obs);
        weights.push(w);
    }

    (points2d, weights)
}

fn ground_truth_pose() -> Iso3 {
    Iso3::from_parts(
        Translation3::new(0.1, -0.05, 0.3),
        Rotation3::from_euler_angles(0.1, 0.2, -0.05).into(),
    )
}

#[test]
fn recovers_rig_pose_without_initial_guess() {
    let points3d = centered_grid_points(5, 4, 0.06);
    let (cam_poses, cam_matrices) = make_rig();
    let pose_gt = ground_truth_pose();

    // Partial visibility: every camera misses a few different points.
    let (points2d, weights) = observe(
        &points3d,
        &pose_gt,
        &cam_poses,
        &cam_matrices,
        |cam, idx| match cam {
            1 => idx % 5 != 0,
            2 => idx % 7 != 3,
            _ => true,
        },
        None,
    );

    let opts = RigPoseOptions {
        min_correspondences: 6,
        ..Default::default()
    };
    let estimate = estimate_rig_pose(
        &points3d,
        &points2d,
        &weights,
        &cam_poses,
        &cam_matrices,
        &opts,
        None,
        None,
    )
    .unwrap();

    match estimate {
        RigPoseEstimate::Estimated { pose, residual } => {
            assert!(residual < 1e-9, "residual {residual} not near zero");
            let dt = (pose.pose.translation.vector - pose_gt.translation.vector).norm();
            let ang = pose.pose.rotation.angle_to(&pose_gt.rotation);
            assert!(dt < 1e-6, "translation error {dt}");
            assert!(ang < 1e-6, "rotation error {ang}");
            assert!((pose.covariance[(0, 0)] - residual).abs() < 1e-15);
        }
        other => panic!("expected an estimate, got {other:?}"),
    }
}

#[test]
fn refines_a_perturbed_initial_pose() {
    let points3d = centered_grid_points(5, 4, 0.06);
    let (cam_poses, cam_matrices) = make_rig();
    let pose_gt = ground_truth_pose();

    let (points2d, weights) = observe(
        &points3d,
        &pose_gt,
        &cam_poses,
        &cam_matrices,
        |_, _| true,
        None,
    );

    let initial = Iso3::from_parts(
        Translation3::new(0.12, -0.04, 0.28),
        Rotation3::from_euler_angles(0.08, 0.22, -0.06).into(),
    );

    let estimate = estimate_rig_pose(
        &points3d,
        &points2d,
        &weights,
        &cam_poses,
        &cam_matrices,
        &RigPoseOptions::default(),
        Some(initial),
        None,
    )
    .unwrap();

    let pose = estimate.pose().expect("estimate succeeded").pose;
    assert!((pose.translation.vector - pose_gt.translation.vector).norm() < 1e-6);
    assert!(pose.rotation.angle_to(&pose_gt.rotation) < 1e-6);
}

#[test]
fn noisy_observations_still_land_near_ground_truth() {
    let points3d = centered_grid_points(5, 4, 0.06);
    let (cam_poses, cam_matrices) = make_rig();
    let pose_gt = ground_truth_pose();

    let noise = UniformPixelNoise {
        seed: 17,
        max_abs_px: 0.3,
    };
    let (points2d, weights) = observe(
        &points3d,
        &pose_gt,
        &cam_poses,
        &cam_matrices,
        |_, _| true,
        Some(noise),
    );

    let estimate = estimate_rig_pose(
        &points3d,
        &points2d,
        &weights,
        &cam_poses,
        &cam_matrices,
        &RigPoseOptions::default(),
        None,
        None,
    )
    .unwrap();

    match estimate {
        RigPoseEstimate::Estimated { pose, residual } => {
            assert!(residual > 0.0);
            let dt = (pose.pose.translation.vector - pose_gt.translation.vector).norm();
            let ang = pose.pose.rotation.angle_to(&pose_gt.rotation);
            assert!(dt < 5e-3, "translation error {dt} too large under noise");
            assert!(ang < 5e-3, "rotation error {ang} too large under noise");
        }
        other => panic!("expected an estimate, got {other:?}"),
    }
}

#[test]
fn too_few_observations_in_one_camera_are_rejected_by_value() {
    let points3d = centered_grid_points(5, 4, 0.06);
    let (cam_poses, cam_matrices) = make_rig();

    // Camera 2 only sees four points; gate demands six everywhere.
    let (points2d, weights) = observe(
        &points3d,
        &ground_truth_pose(),
        &cam_poses,
        &cam_matrices,
        |cam, idx| cam != 2 || idx < 4,
        None,
    );

    let opts = RigPoseOptions {
        min_correspondences: 6,
        ..Default::default()
    };
    let estimate = estimate_rig_pose(
        &points3d,
        &points2d,
        &weights,
        &cam_poses,
        &cam_matrices,
        &opts,
        None,
        None,
    )
    .unwrap();

    match &estimate {
        RigPoseEstimate::InsufficientObservations {
            min_observed,
            max_observed,
        } => {
            assert_eq!(*min_observed, 4);
            assert_eq!(*max_observed, 20);
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(!estimate.is_estimated());
    assert!(estimate.residual().is_none());
}

#[test]
fn bootstrap_requires_four_points_in_the_best_camera() {
    let points3d = centered_grid_points(5, 4, 0.06);
    let (cam_poses, cam_matrices) = make_rig();

    // Three visible points everywhere: enough for the gate with
    // min_correspondences = 3, but not for the homography bootstrap.
    let (points2d, weights) = observe(
        &points3d,
        &ground_truth_pose(),
        &cam_poses,
        &cam_matrices,
        |_, idx| idx < 3,
        None,
    );

    let estimate = estimate_rig_pose(
        &points3d,
        &points2d,
        &weights,
        &cam_poses,
        &cam_matrices,
        &RigPoseOptions::default(),
        None,
        None,
    )
    .unwrap();

    assert!(matches!(
        estimate,
        RigPoseEstimate::InsufficientObservations { max_observed: 3, .. }
    ));
}

#[test]
fn malformed_inputs_fail_with_typed_errors() {
    let points3d = centered_grid_points(5, 4, 0.06);
    let (cam_poses, cam_matrices) = make_rig();
    let (points2d, mut weights) = observe(
        &points3d,
        &ground_truth_pose(),
        &cam_poses,
        &cam_matrices,
        |_, _| true,
        None,
    );
    let opts = RigPoseOptions::default();

    let two_points = vec![Pt3::new(0.0, 0.0, 0.0), Pt3::new(0.1, 0.0, 0.0)];
    assert!(matches!(
        estimate_rig_pose(
            &two_points,
            &points2d,
            &weights,
            &cam_poses,
            &cam_matrices,
            &opts,
            None,
            None
        ),
        Err(RigPoseError::TooFewPoints(2))
    ));

    assert!(matches!(
        estimate_rig_pose(
            &points3d,
            &points2d,
            &weights,
            &cam_poses,
            &cam_matrices[..2],
            &opts,
            None,
            None
        ),
        Err(RigPoseError::CameraCountMismatch { .. })
    ));

    weights[1].pop();
    assert!(matches!(
        estimate_rig_pose(
            &points3d,
            &points2d,
            &weights,
            &cam_poses,
            &cam_matrices,
            &opts,
            None,
            None
        ),
        Err(RigPoseError::ObservationLengthMismatch { camera: 1, .. })
    ));
}

#[test]
fn bundle_mode_matches_direct_subrange_calls() {
    let bundle = centered_grid_points(5, 4, 0.06);
    let (cam_poses, cam_matrices) = make_rig();

    // Two independently-posed copies of the same sub-target.
    let pose_a = ground_truth_pose();
    let pose_b = Iso3::from_parts(
        Translation3::new(-0.15, 0.1, 0.4),
        Rotation3::from_euler_angles(-0.05, -0.15, 0.1).into(),
    );

    let points3d: Vec<Pt3> = bundle.iter().chain(bundle.iter()).copied().collect();
    let (obs_a, w_a) = observe(&bundle, &pose_a, &cam_poses, &cam_matrices, |_, _| true, None);
    let (obs_b, w_b) = observe(&bundle, &pose_b, &cam_poses, &cam_matrices, |_, _| true, None);

    let points2d: Vec<Vec<Vec2>> = obs_a
        .into_iter()
        .zip(obs_b)
        .map(|(a, b)| a.into_iter().chain(b).collect())
        .collect();
    let weights: Vec<Vec<Real>> = w_a
        .into_iter()
        .zip(w_b)
        .map(|(a, b)| a.into_iter().chain(b).collect())
        .collect();

    let opts = RigPoseOptions::default();
    let estimates = estimate_rig_pose_bundles(
        &points3d,
        &points2d,
        &weights,
        &cam_poses,
        &cam_matrices,
        &opts,
        &[20, 20],
    )
    .unwrap();
    assert_eq!(estimates.len(), 2);

    for (idx, (estimate, pose_gt)) in estimates.iter().zip([pose_a, pose_b]).enumerate() {
        let pose = estimate.pose().expect("bundle estimate succeeded").pose;
        assert!(
            (pose.translation.vector - pose_gt.translation.vector).norm() < 1e-6,
            "bundle {idx} translation off"
        );
        assert!(pose.rotation.angle_to(&pose_gt.rotation) < 1e-6);

        // Same computation as a direct call on the bundle's sub-range.
        let direct = estimate_rig_pose(
            &points3d,
            &points2d,
            &weights,
            &cam_poses,
            &cam_matrices,
            &opts,
            None,
            Some(20 * idx..20 * (idx + 1)),
        )
        .unwrap();
        let direct_pose = direct.pose().expect("direct estimate succeeded").pose;
        assert!((pose.translation.vector - direct_pose.translation.vector).norm() < 1e-12);
        assert!(pose.rotation.angle_to(&direct_pose.rotation) < 1e-12);
    }
}

#[test]
fn out_of_bounds_range_is_a_typed_error() {
    let points3d = centered_grid_points(5, 4, 0.06);
    let (cam_poses, cam_matrices) = make_rig();
    let (points2d, weights) = observe(
        &points3d,
        &ground_truth_pose(),
        &cam_poses,
        &cam_matrices,
        |_, _| true,
        None,
    );

    assert!(matches!(
        estimate_rig_pose_bundles(
            &points3d,
            &points2d,
            &weights,
            &cam_poses,
            &cam_matrices,
            &RigPoseOptions::default(),
            &[15, 15],
        ),
        Err(RigPoseError::RangeOutOfBounds { .. })
    ));
}
