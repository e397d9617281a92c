use egui::{Context, TextureOptions};

use crate::ui::FoodLensApp;

impl FoodLensApp {
    /// Mirror the controller's surface into the GPU texture when it changed.
    pub fn sync_surface_texture(&mut self, ctx: &Context) {
        let surface = self.controller.surface();
        if self.texture_revision == Some(surface.revision()) {
            return;
        }
        self.texture_revision = Some(surface.revision());

        let Some(pixels) = surface.pixels() else {
            // Placeholder is painted directly, no texture needed
            self.surface_texture = None;
            return;
        };

        let size = [pixels.width() as usize, pixels.height() as usize];
        let color_image = egui::ColorImage::from_rgb(size, pixels.as_flat_samples().as_slice());

        // Reuse the texture while the raster size is stable (live preview)
        match &mut self.surface_texture {
            Some(texture) if texture.size() == size => {
                texture.set(color_image, TextureOptions::LINEAR);
            }
            _ => {
                let texture = ctx.load_texture("display_surface", color_image, TextureOptions::LINEAR);
                self.surface_texture = Some(texture);
            }
        }
    }
}
