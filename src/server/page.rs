//! Index page

/// Page title and heading
pub const PAGE_TITLE: &str = "Feeding Machine Camera";

/// Render the index page embedding the MJPEG stream
pub fn index_page(width: u32, height: u32) -> String {
    format!(
        "<html>\n\
         <head>\n\
         <title>{title}</title>\n\
         </head>\n\
         <body>\n\
         <center><h1>{title}</h1></center>\n\
         <center><img src=\"stream.mjpg\" width=\"{width}\" height=\"{height}\"></center>\n\
         </body>\n\
         </html>\n",
        title = PAGE_TITLE,
        width = width,
        height = height,
    )
}
