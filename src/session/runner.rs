//! Drives a [`CalibrationSession`] from a [`CommandSource`].

use super::calibration::{Calibration, CalibrationSession, SessionError};
use super::command::{CommandError, CommandSource, SessionCommand};
use crate::mask::coverage;
use crate::model::SegmentationModel;
use crate::render::PreviewWriter;

/// How an interactive session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Confirmed(Calibration),
    Quit,
}

/// Dispatch commands until the session confirms or quits.
///
/// Recoverable errors (no prompts, failed preview, bad input) are reported
/// and the loop asks for the next command. End of input counts as quit.
pub async fn run_session<M, S>(
    mut session: CalibrationSession<'_, M>,
    source: &mut S,
    preview_writer: Option<&PreviewWriter>,
) -> Result<SessionOutcome, CommandError>
where
    M: SegmentationModel,
    S: CommandSource + ?Sized,
{
    refresh_preview(&session, preview_writer);

    loop {
        let command = match source.next_command() {
            Some(Ok(command)) => command,
            Some(Err(CommandError::Io(e))) => return Err(CommandError::Io(e)),
            Some(Err(e)) => {
                println!("⚠️ {}", e);
                continue;
            }
            None => {
                println!("Input closed, quitting...");
                session.quit().ok();
                return Ok(SessionOutcome::Quit);
            }
        };

        match dispatch(&mut session, command).await {
            Ok(Some(outcome)) => return Ok(outcome),
            Ok(None) => refresh_preview(&session, preview_writer),
            Err(SessionError::NoPrompts) => {
                println!("⚠️ Please select at least one point first.");
            }
            Err(e @ SessionError::Inference(_)) => {
                tracing::warn!("{}", e);
                println!("⚠️ {}. Add or change points and try again.", e);
                refresh_preview(&session, preview_writer);
            }
            Err(e) => println!("⚠️ {}", e),
        }
    }
}

async fn dispatch<M: SegmentationModel>(
    session: &mut CalibrationSession<'_, M>,
    command: SessionCommand,
) -> Result<Option<SessionOutcome>, SessionError> {
    match command {
        SessionCommand::AddPoint { point, label } => {
            session.add_point(point, label)?;
            println!(
                "Added {} point ({}, {}) [{} total]",
                label.as_str(),
                point.x,
                point.y,
                session.prompts().len()
            );
            Ok(None)
        }
        SessionCommand::Preview => {
            println!("Generating preview...");
            let preview = session.preview().await?;
            println!(
                "Preview updated (score {:.3}, {:.1}% foreground).",
                preview.score,
                coverage(&preview.mask) * 100.0
            );
            Ok(None)
        }
        SessionCommand::Reset => {
            session.reset()?;
            println!("Points reset.");
            Ok(None)
        }
        SessionCommand::Confirm => {
            let calibration = session.confirm()?;
            println!("✅ Selection confirmed. Calculated relative coordinates.");
            Ok(Some(SessionOutcome::Confirmed(calibration)))
        }
        SessionCommand::Quit => {
            session.quit()?;
            println!("Quitting...");
            Ok(Some(SessionOutcome::Quit))
        }
    }
}

fn refresh_preview<M: SegmentationModel>(
    session: &CalibrationSession<'_, M>,
    preview_writer: Option<&PreviewWriter>,
) {
    let Some(writer) = preview_writer else {
        return;
    };
    let mask = session.current_preview().map(|p| &p.mask);
    if let Err(e) = writer.write(&session.reference().image, session.prompts(), mask) {
        tracing::warn!(
            "Failed to write preview to {}: {}",
            writer.path().display(),
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{FractionalPoint, Label, PixelPoint};
    use crate::session::calibration::ReferenceImage;
    use crate::session::command::LineCommandSource;
    use crate::test_utils::{scratch_dir, SquareModel};
    use image::DynamicImage;
    use std::io::Cursor;

    fn reference() -> ReferenceImage {
        ReferenceImage::new("ref.png", DynamicImage::new_rgb8(100, 100))
    }

    #[tokio::test]
    async fn test_run_session_confirms() {
        let mut model = SquareModel::default();
        let session = CalibrationSession::start(&mut model, reference())
            .await
            .unwrap();
        let mut commands = vec![
            SessionCommand::Preview,
            SessionCommand::AddPoint {
                point: PixelPoint::new(50, 50),
                label: Label::Positive,
            },
            SessionCommand::Preview,
            SessionCommand::Confirm,
        ]
        .into_iter();

        let outcome = run_session(session, &mut commands, None).await.unwrap();
        match outcome {
            SessionOutcome::Confirmed(calibration) => {
                assert_eq!(calibration.prompts.len(), 1);
                assert_eq!(
                    calibration.prompts.as_slice()[0].point,
                    FractionalPoint::new(0.5, 0.5)
                );
            }
            SessionOutcome::Quit => panic!("expected confirmation"),
        }
        // The first preview had no prompts and never reached the model.
        assert_eq!(model.calls.get(), 1);
    }

    #[tokio::test]
    async fn test_run_session_recovers_from_errors() {
        let mut model = SquareModel::default();
        let session = CalibrationSession::start(&mut model, reference())
            .await
            .unwrap();
        let script = "enter\nfly away\n+ 500 500\n- 10 10\n+ 20 30\nr\n+ 25 75\nc\n";
        let mut source = LineCommandSource::new(Cursor::new(script));

        let outcome = run_session(session, &mut source, None).await.unwrap();
        let SessionOutcome::Confirmed(calibration) = outcome else {
            panic!("expected confirmation");
        };
        assert_eq!(calibration.prompts.len(), 1);
        assert_eq!(
            calibration.prompts.as_slice()[0].point,
            FractionalPoint::new(0.25, 0.75)
        );
    }

    #[tokio::test]
    async fn test_run_session_quit_and_eof() {
        let mut model = SquareModel::default();
        let session = CalibrationSession::start(&mut model, reference())
            .await
            .unwrap();
        let mut source = LineCommandSource::new(Cursor::new("+ 1 1\nq\n+ 2 2\n"));
        assert_eq!(
            run_session(session, &mut source, None).await.unwrap(),
            SessionOutcome::Quit
        );

        let session = CalibrationSession::start(&mut model, reference())
            .await
            .unwrap();
        let mut source = LineCommandSource::new(Cursor::new("+ 1 1\n"));
        assert_eq!(
            run_session(session, &mut source, None).await.unwrap(),
            SessionOutcome::Quit
        );
    }

    #[tokio::test]
    async fn test_run_session_writes_preview_file() {
        let dir = scratch_dir("preview");
        let writer = PreviewWriter::new(dir.join("preview.png"));
        let mut model = SquareModel::default();
        let session = CalibrationSession::start(&mut model, reference())
            .await
            .unwrap();
        let mut source = LineCommandSource::new(Cursor::new("+ 50 50\nspace\nq\n"));

        run_session(session, &mut source, Some(&writer)).await.unwrap();

        let written = image::open(writer.path()).unwrap().to_rgb8();
        assert_eq!(written.dimensions(), (100, 100));
        // Marker at the click, red blend inside the mask away from the marker.
        assert_eq!(written.get_pixel(50, 50).0, [0, 255, 0]);
        assert_eq!(written.get_pixel(58, 58).0, [127, 0, 0]);
        std::fs::remove_dir_all(dir).ok();
    }
}
